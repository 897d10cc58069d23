use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Caller-chosen id echoed back with one-shot request results.
pub type RequestId = u64;

/// Identity of one start attempt and the poll loop that follows it.
pub type LoopId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    UploadCompleted {
        request_id: RequestId,
        result: Result<ParsedPreview, ServiceError>,
    },
    OperationStarted {
        loop_id: LoopId,
        result: Result<StartedOperation, ServiceError>,
    },
    StatusPolled {
        loop_id: LoopId,
        result: Result<StatusReport, ServiceError>,
    },
    TicketFetched {
        request_id: RequestId,
        result: Result<TicketDetails, ServiceError>,
    },
    HealthChecked(Result<HealthReport, ServiceError>),
}

/// Parsed spreadsheet returned by the upload endpoint. Cells are
/// stringified; `null` becomes an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPreview {
    pub preview_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, String>>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartedOperation {
    pub operation_id: String,
    #[serde(default)]
    pub total_tickets: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[serde(alias = "processing", alias = "pending")]
    Running,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReportStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowState {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RowCreation {
    pub success: bool,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RowReport {
    pub row: u32,
    #[serde(default)]
    pub summary: String,
    pub status: RowState,
    #[serde(default)]
    pub result: Option<RowCreation>,
}

/// One status poll response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusReport {
    /// Filled from the request when the server omits it.
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub total_tickets: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
    pub status: ReportStatus,
    #[serde(default)]
    pub results: Vec<RowReport>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicketDetails {
    pub key: String,
    pub summary: String,
    pub issue_type: String,
    pub status: String,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    /// Raw timestamp as reported by the ticketing service.
    pub created: String,
    pub labels: Vec<String>,
    /// Plain text; rich-text documents are flattened.
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub jira_connection: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: FailureKind,
    pub message: String,
    from_server: bool,
}

impl ServiceError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            from_server: false,
        }
    }

    /// Error whose message was written by the server for the operator.
    pub fn from_server(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            from_server: true,
        }
    }

    /// Text fit for a notice: the server's own message when it sent one,
    /// otherwise `fallback` with the transport detail appended.
    pub fn user_message(&self, fallback: &str) -> String {
        let message = self.message.trim();
        if self.from_server && !message.is_empty() {
            message.to_string()
        } else if message.is_empty() {
            fallback.to_string()
        } else {
            format!("{fallback}: {message}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    /// The envelope said `success: false`.
    Rejected,
    Timeout,
    Network,
    InvalidResponse,
    TooLarge { max_bytes: u64, actual: Option<u64> },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::InvalidResponse => write!(f, "invalid response"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
        }
    }
}
