use thiserror::Error;

/// Every failure the operator can be told about.
///
/// The `Display` text is exactly what the notifier shows, so server-supplied
/// messages are carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImporterError {
    // Local validation: never reaches the network.
    #[error("Please select a valid Excel file (.xlsx or .xls)")]
    InvalidFileType { name: String },

    #[error("File size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("The selected file is empty")]
    EmptyFile,

    #[error("No preview data available")]
    NoPreviewAvailable,

    #[error("Please enter a ticket ID")]
    EmptyTicketKey,

    #[error("Invalid ticket key format")]
    InvalidTicketKey { key: String },

    // Request-level failures, already converted to user-facing text.
    #[error("{0}")]
    Upload(String),

    #[error("{0}")]
    Start(String),

    #[error("Status check failed: {0}")]
    Poll(String),

    #[error("Stopped checking status after {failures} consecutive failures")]
    PollingAbandoned { failures: u32 },

    #[error("Ticket creation failed: {0}")]
    OperationFailed(String),

    #[error("{0}")]
    Lookup(String),
}

impl ImporterError {
    /// True for errors detected before any request was issued.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ImporterError::InvalidFileType { .. }
                | ImporterError::FileTooLarge { .. }
                | ImporterError::EmptyFile
                | ImporterError::NoPreviewAvailable
                | ImporterError::EmptyTicketKey
                | ImporterError::InvalidTicketKey { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::ImporterError;

    #[test]
    fn server_text_is_shown_verbatim() {
        assert_eq!(
            ImporterError::Start("quota exceeded".into()).to_string(),
            "quota exceeded"
        );
        assert_eq!(
            ImporterError::Upload("Missing required column: Summary".into()).to_string(),
            "Missing required column: Summary"
        );
    }

    #[test]
    fn local_errors_are_flagged() {
        assert!(ImporterError::InvalidFileType {
            name: "notes.txt".into()
        }
        .is_local());
        assert!(ImporterError::NoPreviewAvailable.is_local());
        assert!(!ImporterError::Poll("timeout".into()).is_local());
        assert!(!ImporterError::Start("quota exceeded".into()).is_local());
    }
}
