use crate::{OperationId, PollHandle, PreviewHandle, UploadFile, UploadSeq};

/// Outside work requested by [`crate::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the file to the upload/parse endpoint.
    UploadFile { seq: UploadSeq, file: UploadFile },
    /// Ask the server to create tickets for a parsed preview.
    StartOperation {
        handle: PollHandle,
        preview: PreviewHandle,
    },
    /// Begin the status poll loop for a started run, replacing any other loop.
    StartPolling {
        handle: PollHandle,
        operation_id: OperationId,
    },
    /// Cancel the poll loop owned by `handle`. A no-op if it already ended.
    StopPolling { handle: PollHandle },
    /// Fetch one ticket for the lookup view.
    LookupTicket { seq: u64, key: String },
}
