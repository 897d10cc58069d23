use crate::{
    NoticeId, OperationId, OperationPhase, PreviewData, RowResult, RowStatus, Section, Tab,
    Ticket,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub section: Section,
    pub tab: Tab,
    pub uploading: bool,
    pub preview: Option<PreviewView>,
    pub progress: Option<ProgressView>,
    /// Notices of the active tab only.
    pub notices: Vec<NoticeView>,
    pub lookup: LookupView,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewView {
    pub caption: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PreviewView {
    pub(crate) fn from_data(data: &PreviewData) -> Self {
        Self {
            caption: data.caption(),
            columns: data.columns().to_vec(),
            rows: data.table(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub phase: OperationPhase,
    pub operation_id: Option<OperationId>,
    pub completed: u32,
    pub failed: u32,
    pub done: u32,
    pub total: u32,
    pub percentage: u32,
    /// Present once the run reached a terminal status.
    pub summary: Option<String>,
    pub rows: Vec<RowView>,
}

impl ProgressView {
    pub fn progress_text(&self) -> String {
        format!("{} / {} completed", self.done, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub row: u32,
    pub summary: String,
    pub status: RowStatus,
    pub detail: String,
}

impl RowView {
    pub(crate) fn from_result(result: &RowResult) -> Self {
        Self {
            row: result.row,
            summary: result.summary.clone(),
            status: result.status,
            detail: result.detail(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeView {
    pub id: NoticeId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LookupView {
    pub loading: bool,
    pub ticket: Option<Ticket>,
}
