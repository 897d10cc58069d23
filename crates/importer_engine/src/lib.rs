//! Importer engine: HTTP client for the ticket service and the async
//! runtime that executes core effects.
mod adf;
mod engine;
mod envelope;
mod poll;
mod service;
mod types;

pub use adf::extract_plain_text;
pub use engine::{EngineError, EngineHandle};
pub use poll::{ChannelEventSink, EventSink, PollLoop, PollSupervisor};
pub use service::{ReqwestTicketService, ServiceSettings, TicketService};
pub use types::{
    EngineEvent, FailureKind, HealthReport, LoopId, ParsedPreview, ReportStatus, RequestId,
    RowCreation, RowReport, RowState, ServiceError, StartedOperation, StatusReport,
    TicketDetails,
};
