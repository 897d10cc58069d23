//! Importer core: pure state machine and view-model helpers.
//!
//! Nothing in this crate performs IO or reads a clock. Every outside event
//! enters through [`update`] as a [`Msg`], and every request for outside work
//! leaves as an [`Effect`].
mod effect;
mod error;
mod lookup;
mod msg;
mod notifier;
mod operation;
mod preview;
mod section;
mod state;
mod update;
mod upload;
mod view_model;

pub use effect::Effect;
pub use error::ImporterError;
pub use lookup::{normalize_ticket_key, Ticket};
pub use msg::Msg;
pub use notifier::{Notice, NoticeId, Notifier, Tab, DEFAULT_NOTICE_TTL};
pub use operation::{
    progress_percentage, CompletionSummary, OperationId, OperationPhase, OperationSnapshot,
    OperationStatus, Orchestrator, PollHandle, PollPolicy, RowOutcome, RowResult, RowStatus,
    StartedRun, Tally, DEFAULT_MAX_CONSECUTIVE_POLL_FAILURES,
};
pub use preview::{PreviewData, PreviewRow, PREVIEW_ROW_LIMIT};
pub use section::{Section, SectionState};
pub use state::{AppState, CoreSettings};
pub use update::update;
pub use upload::{
    has_allowed_extension, validate_upload, PreviewHandle, UploadFile, UploadSeq,
    UploadedPreview, DEFAULT_MAX_UPLOAD_BYTES,
};
pub use view_model::{AppViewModel, LookupView, NoticeView, PreviewView, ProgressView, RowView};
