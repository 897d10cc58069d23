use std::time::{Duration, Instant};

use chrono::DateTime;
use importer_core::{
    Effect, Msg, OperationId, OperationSnapshot, OperationStatus, PollHandle, PreviewHandle,
    RowOutcome, RowResult, RowStatus, StartedRun, Ticket, UploadedPreview,
};
use importer_engine::{
    EngineEvent, EngineHandle, HealthReport, ParsedPreview, ReportStatus, RowReport, RowState,
    ServiceError, StatusReport, TicketDetails,
};
use importer_logging::{importer_info, importer_warn};

/// Executes core effects on the engine and turns engine events back into
/// core messages.
pub struct EffectRunner {
    engine: EngineHandle,
    browse_base: Option<String>,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, browse_base: Option<String>) -> Self {
        Self {
            engine,
            browse_base,
        }
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::UploadFile { seq, file } => {
                    importer_info!(
                        "UploadFile seq={} name={} size={}",
                        seq,
                        file.name,
                        file.size()
                    );
                    self.engine.upload(seq, file.name, file.bytes);
                }
                Effect::StartOperation { handle, preview } => {
                    importer_info!("StartOperation {} preview={}", handle, preview);
                    self.engine.start_operation(handle.get(), preview.as_str());
                }
                Effect::StartPolling {
                    handle,
                    operation_id,
                } => {
                    importer_info!("StartPolling {} operation={}", handle, operation_id);
                    self.engine.start_polling(handle.get(), operation_id.as_str());
                }
                Effect::StopPolling { handle } => {
                    importer_info!("StopPolling {}", handle);
                    self.engine.stop_polling(handle.get());
                }
                Effect::LookupTicket { seq, key } => {
                    importer_info!("LookupTicket seq={} key={}", seq, key);
                    self.engine.lookup(seq, key);
                }
            }
        }
    }

    /// Waits up to `timeout` for the next engine event that maps to a message.
    pub fn next_msg(&self, timeout: Duration) -> Option<Msg> {
        let event = self.engine.recv_timeout(timeout)?;
        map_event(event, self.browse_base.as_deref())
    }

    /// Health checks bypass the core: there is no state to update.
    pub fn check_health(&self, timeout: Duration) -> Option<Result<HealthReport, ServiceError>> {
        self.engine.check_health();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.engine.recv_timeout(remaining)? {
                EngineEvent::HealthChecked(result) => return Some(result),
                other => importer_warn!(
                    "ignoring unrelated event during health check: {:?}",
                    other
                ),
            }
        }
    }
}

fn map_event(event: EngineEvent, browse_base: Option<&str>) -> Option<Msg> {
    let msg = match event {
        EngineEvent::UploadCompleted { request_id, result } => Msg::UploadFinished {
            seq: request_id,
            result: result
                .map(map_preview)
                .map_err(|err| describe(&err, "Upload failed")),
        },
        EngineEvent::OperationStarted { loop_id, result } => Msg::OperationStarted {
            handle: PollHandle::new(loop_id),
            result: result
                .map(|started| StartedRun {
                    operation_id: OperationId::new(started.operation_id),
                    total_tickets: started.total_tickets,
                })
                .map_err(|err| describe(&err, "Failed to start ticket creation")),
        },
        EngineEvent::StatusPolled { loop_id, result } => Msg::PollCompleted {
            handle: PollHandle::new(loop_id),
            result: result
                .map(map_snapshot)
                .map_err(|err| describe(&err, "server unreachable")),
        },
        EngineEvent::TicketFetched { request_id, result } => Msg::LookupFinished {
            seq: request_id,
            result: result
                .map(|details| map_ticket(details, browse_base))
                .map_err(|err| describe(&err, "Error searching ticket")),
        },
        EngineEvent::HealthChecked(_) => return None,
    };
    Some(msg)
}

fn describe(err: &ServiceError, fallback: &str) -> String {
    importer_warn!("{}: {}", fallback, err);
    err.user_message(fallback)
}

fn map_preview(preview: ParsedPreview) -> UploadedPreview {
    UploadedPreview {
        handle: PreviewHandle::new(preview.preview_id),
        columns: preview.columns,
        rows: preview.rows,
        total_rows: preview.total_rows,
    }
}

fn map_snapshot(report: StatusReport) -> OperationSnapshot {
    OperationSnapshot {
        operation_id: OperationId::new(report.operation_id),
        total_tickets: report.total_tickets,
        completed: report.completed,
        failed: report.failed,
        status: map_status(report.status),
        results: report.results.into_iter().map(map_row).collect(),
        error: report.error,
    }
}

fn map_status(status: ReportStatus) -> OperationStatus {
    match status {
        ReportStatus::Running => OperationStatus::Running,
        ReportStatus::Completed => OperationStatus::Completed,
        ReportStatus::Failed => OperationStatus::Failed,
    }
}

fn map_row(report: RowReport) -> RowResult {
    let RowReport {
        row,
        summary,
        status,
        result,
    } = report;
    match (status, result) {
        (RowState::Processing, _) => RowResult::processing(row, summary),
        (RowState::Completed, Some(created)) if created.success => {
            RowResult::created(row, summary, created.ticket_id.unwrap_or_default())
        }
        (RowState::Completed, None) => RowResult {
            row,
            summary,
            status: RowStatus::Completed,
            outcome: None,
        },
        (RowState::Completed, Some(failed)) | (RowState::Failed, Some(failed)) => {
            RowResult::failed(row, summary, failed.error.unwrap_or_else(unknown_error))
        }
        (RowState::Failed, None) => RowResult {
            row,
            summary,
            status: RowStatus::Failed,
            outcome: Some(RowOutcome::Failed {
                error: unknown_error(),
            }),
        },
    }
}

fn unknown_error() -> String {
    "Unknown error".to_string()
}

fn map_ticket(details: TicketDetails, browse_base: Option<&str>) -> Ticket {
    let browse_url =
        browse_base.map(|base| format!("{}/browse/{}", base.trim_end_matches('/'), details.key));
    Ticket {
        created: format_created(&details.created),
        key: details.key,
        summary: details.summary,
        issue_type: details.issue_type,
        status: details.status,
        priority: details.priority,
        assignee: details.assignee,
        labels: details.labels,
        description: details.description,
        browse_url,
    }
}

/// Calendar date of a ticket timestamp; unparseable input is shown as is.
fn format_created(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|created| created.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
