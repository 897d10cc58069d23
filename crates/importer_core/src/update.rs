use importer_logging::{importer_debug, importer_info};

use crate::operation::{PollOutcome, StartOutcome};
use crate::{
    normalize_ticket_key, validate_upload, AppState, Effect, ImporterError, Msg, OperationPhase,
    Section,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::FileSubmitted(file) => {
            let max = state.settings().max_upload_bytes;
            if let Err(err) = validate_upload(&file.name, file.size(), max) {
                state.report(&err);
                return (state, Vec::new());
            }
            let mut effects = stop_run(&mut state);
            let seq = state.upload_mut().begin();
            importer_info!("uploading {} ({} bytes) as #{}", file.name, file.size(), seq);
            state.show(Section::Parsing);
            state.mark_dirty();
            effects.push(Effect::UploadFile { seq, file });
            effects
        }
        Msg::UploadFinished { seq, result } => {
            if !state.upload_mut().finish(seq) {
                return (state, Vec::new());
            }
            match result {
                Ok(uploaded) => {
                    importer_info!(
                        "preview {} ready: {} rows",
                        uploaded.handle,
                        uploaded.total_rows
                    );
                    state.upload_mut().accept(uploaded);
                    state.show(Section::Preview);
                }
                Err(message) => {
                    state.report(&ImporterError::Upload(message));
                    state.show(Section::Upload);
                }
            }
            state.mark_dirty();
            Vec::new()
        }
        Msg::CreateTicketsClicked => {
            if state.orchestrator().phase() == OperationPhase::Starting {
                importer_debug!("start already in flight; ignoring click");
                return (state, Vec::new());
            }
            let Some(preview) = state.preview_handle().cloned() else {
                state.report(&ImporterError::NoPreviewAvailable);
                return (state, Vec::new());
            };
            let ticket = state.orchestrator_mut().begin_start();
            state.show(Section::Progress);
            state.mark_dirty();
            let mut effects = Vec::with_capacity(2);
            if let Some(handle) = ticket.superseded {
                effects.push(Effect::StopPolling { handle });
            }
            effects.push(Effect::StartOperation {
                handle: ticket.handle,
                preview,
            });
            effects
        }
        Msg::OperationStarted { handle, result } => {
            match state.orchestrator_mut().on_started(handle, result) {
                StartOutcome::Stale => Vec::new(),
                StartOutcome::Polling {
                    handle,
                    operation_id,
                } => {
                    state.mark_dirty();
                    vec![Effect::StartPolling {
                        handle,
                        operation_id,
                    }]
                }
                StartOutcome::Rejected(message) => {
                    state.report(&ImporterError::Start(message));
                    state.show(Section::Preview);
                    Vec::new()
                }
            }
        }
        Msg::PollCompleted { handle, result } => {
            match state.orchestrator_mut().on_poll(handle, result) {
                PollOutcome::Stale => Vec::new(),
                PollOutcome::Merged => {
                    state.mark_dirty();
                    Vec::new()
                }
                PollOutcome::Failed(message) => {
                    state.report(&ImporterError::Poll(message));
                    Vec::new()
                }
                PollOutcome::Stalled { handle, failures } => {
                    state.report(&ImporterError::PollingAbandoned { failures });
                    vec![Effect::StopPolling { handle }]
                }
                PollOutcome::Finished { handle, error, .. } => {
                    if let Some(message) = error {
                        state.report(&ImporterError::OperationFailed(message));
                    }
                    state.mark_dirty();
                    vec![Effect::StopPolling { handle }]
                }
            }
        }
        Msg::ResetClicked => {
            let effects = stop_run(&mut state);
            state.upload_mut().reset();
            state.show(Section::Upload);
            state.mark_dirty();
            effects
        }
        Msg::TabSelected(tab) => {
            state.select_tab(tab);
            Vec::new()
        }
        Msg::LookupRequested(raw) => {
            if state.lookup_mut().is_loading() {
                importer_debug!("lookup already in flight; ignoring {:?}", raw);
                return (state, Vec::new());
            }
            match normalize_ticket_key(&raw) {
                Ok(key) => {
                    let seq = state.lookup_mut().begin();
                    state.mark_dirty();
                    vec![Effect::LookupTicket { seq, key }]
                }
                Err(err) => {
                    state.report(&err);
                    Vec::new()
                }
            }
        }
        Msg::LookupFinished { seq, result } => {
            if !state.lookup_mut().finish(seq) {
                return (state, Vec::new());
            }
            match result {
                Ok(ticket) => state.lookup_mut().show(Some(ticket)),
                Err(message) => {
                    state.lookup_mut().show(None);
                    state.report(&ImporterError::Lookup(message));
                }
            }
            state.mark_dirty();
            Vec::new()
        }
        Msg::NoticeDismissed(id) => {
            if state.notifier_mut().dismiss(id) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::Tick { elapsed } => {
            if state.notifier_mut().advance(elapsed) > 0 {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

/// Discards the current run, returning the cancellation for its live loop.
fn stop_run(state: &mut AppState) -> Vec<Effect> {
    let had_run = state.orchestrator().phase() != OperationPhase::Idle;
    let cancelled = state.orchestrator_mut().reset();
    if had_run {
        state.mark_dirty();
    }
    cancelled
        .map(|handle| Effect::StopPolling { handle })
        .into_iter()
        .collect()
}
