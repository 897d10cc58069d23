use std::time::Duration;

use importer_logging::{importer_debug, importer_warn};

use crate::lookup::LookupState;
use crate::upload::UploadSession;
use crate::view_model::{AppViewModel, LookupView, NoticeView, PreviewView, ProgressView, RowView};
use crate::{
    ImporterError, Notifier, OperationPhase, Orchestrator, PollPolicy, PreviewData,
    PreviewHandle, Section, SectionState, Tab, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_NOTICE_TTL,
};

/// Knobs the host may tune; everything else is fixed behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSettings {
    pub max_upload_bytes: u64,
    pub notice_ttl: Duration,
    pub poll_policy: PollPolicy,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            notice_ttl: DEFAULT_NOTICE_TTL,
            poll_policy: PollPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    settings: CoreSettings,
    sections: SectionState,
    tab: Tab,
    upload: UploadSession,
    orchestrator: Orchestrator,
    notifier: Notifier,
    lookup: LookupState,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: CoreSettings) -> Self {
        Self {
            settings,
            orchestrator: Orchestrator::new(settings.poll_policy),
            notifier: Notifier::new(settings.notice_ttl),
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn section(&self) -> Section {
        self.sections.visible()
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn preview_handle(&self) -> Option<&PreviewHandle> {
        self.upload.handle()
    }

    pub fn preview(&self) -> Option<&PreviewData> {
        self.upload.preview()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            section: self.sections.visible(),
            tab: self.tab,
            uploading: self.upload.is_in_flight(),
            preview: self.upload.preview().map(PreviewView::from_data),
            progress: self.progress_view(),
            notices: self
                .notifier
                .active(self.tab)
                .map(|notice| NoticeView {
                    id: notice.id,
                    message: notice.message.clone(),
                })
                .collect(),
            lookup: LookupView {
                loading: self.lookup.is_loading(),
                ticket: self.lookup.ticket().cloned(),
            },
            dirty: self.dirty,
        }
    }

    /// Returns whether anything visible changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn progress_view(&self) -> Option<ProgressView> {
        let phase = self.orchestrator.phase();
        if phase == OperationPhase::Idle {
            return None;
        }
        let tally = self.orchestrator.tally();
        Some(ProgressView {
            phase,
            operation_id: self.orchestrator.operation_id().cloned(),
            completed: tally.completed,
            failed: tally.failed,
            done: tally.done(),
            total: tally.total,
            percentage: tally.percentage(),
            summary: self.orchestrator.summary().map(|s| s.to_string()),
            rows: self.orchestrator.rows().map(RowView::from_result).collect(),
        })
    }

    // ── Mutators used by `update` ─────────────────────────────────────────

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn show(&mut self, section: Section) {
        if self.sections.show(section) {
            self.dirty = true;
        }
    }

    pub(crate) fn select_tab(&mut self, tab: Tab) {
        if self.tab != tab {
            self.tab = tab;
            self.dirty = true;
        }
    }

    /// Reports an error in the active region.
    pub(crate) fn report(&mut self, error: &ImporterError) {
        if error.is_local() {
            importer_debug!("rejected input: {}", error);
        } else {
            importer_warn!("{}", error);
        }
        let region = self.tab;
        self.notifier.notify(error.to_string(), region);
        self.dirty = true;
    }

    pub(crate) fn upload_mut(&mut self) -> &mut UploadSession {
        &mut self.upload
    }

    pub(crate) fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }

    pub(crate) fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    pub(crate) fn lookup_mut(&mut self) -> &mut LookupState {
        &mut self.lookup
    }
}
