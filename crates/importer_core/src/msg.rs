use std::time::Duration;

use crate::{
    NoticeId, OperationSnapshot, PollHandle, StartedRun, Tab, Ticket, UploadFile, UploadSeq,
    UploadedPreview,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Operator picked a spreadsheet to upload.
    FileSubmitted(UploadFile),
    /// Upload/parse endpoint answered. Errors carry user-facing text.
    UploadFinished {
        seq: UploadSeq,
        result: Result<UploadedPreview, String>,
    },
    /// Operator confirmed ticket creation for the current preview.
    CreateTicketsClicked,
    /// Create-batch endpoint answered.
    OperationStarted {
        handle: PollHandle,
        result: Result<StartedRun, String>,
    },
    /// One status poll finished, successfully or not.
    PollCompleted {
        handle: PollHandle,
        result: Result<OperationSnapshot, String>,
    },
    /// Operator abandoned the current upload/run.
    ResetClicked,
    TabSelected(Tab),
    /// Operator asked to view a ticket (raw, untrimmed input).
    LookupRequested(String),
    LookupFinished {
        seq: u64,
        result: Result<Ticket, String>,
    },
    NoticeDismissed(NoticeId),
    /// Host clock advanced; drives notice expiry.
    Tick { elapsed: Duration },
    /// Fallback for placeholder wiring.
    NoOp,
}
