//! Batch-operation orchestration state.
//!
//! The orchestrator owns one run at a time. Each start attempt mints a fresh
//! [`PollHandle`]; start responses and poll snapshots are only accepted when
//! they carry the current handle, so a superseded or reset run can never
//! touch the state of the next one.

use std::collections::BTreeMap;
use std::fmt;

use importer_logging::{importer_debug, importer_info, importer_warn};

/// Consecutive poll failures tolerated before polling is abandoned.
pub const DEFAULT_MAX_CONSECUTIVE_POLL_FAILURES: u32 = 30;

/// Opaque identifier of one batch-creation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one start attempt and the poll loop that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollHandle(u64);

impl PollHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PollHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Processing,
    Completed,
    Failed,
}

impl RowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RowStatus::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created { ticket_id: String },
    Failed { error: String },
}

/// Latest known state of one input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    pub row: u32,
    pub summary: String,
    pub status: RowStatus,
    pub outcome: Option<RowOutcome>,
}

impl RowResult {
    pub fn processing(row: u32, summary: impl Into<String>) -> Self {
        Self {
            row,
            summary: summary.into(),
            status: RowStatus::Processing,
            outcome: None,
        }
    }

    pub fn created(row: u32, summary: impl Into<String>, ticket_id: impl Into<String>) -> Self {
        Self {
            row,
            summary: summary.into(),
            status: RowStatus::Completed,
            outcome: Some(RowOutcome::Created {
                ticket_id: ticket_id.into(),
            }),
        }
    }

    pub fn failed(row: u32, summary: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            row,
            summary: summary.into(),
            status: RowStatus::Failed,
            outcome: Some(RowOutcome::Failed {
                error: error.into(),
            }),
        }
    }

    /// Human-readable status line for this row.
    pub fn detail(&self) -> String {
        match (&self.status, &self.outcome) {
            (RowStatus::Processing, _) => "Processing...".to_string(),
            (_, Some(RowOutcome::Created { ticket_id })) => format!("Created: {ticket_id}"),
            (_, Some(RowOutcome::Failed { error })) => format!("Failed: {error}"),
            (RowStatus::Completed, None) => "Completed".to_string(),
            (RowStatus::Failed, None) => "Failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationStatus::Running)
    }
}

/// Acknowledgement of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedRun {
    pub operation_id: OperationId,
    /// Ticket count announced by the server, when it sends one.
    pub total_tickets: Option<u32>,
}

impl From<OperationId> for StartedRun {
    fn from(operation_id: OperationId) -> Self {
        Self {
            operation_id,
            total_tickets: None,
        }
    }
}

/// One point-in-time status report for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSnapshot {
    pub operation_id: OperationId,
    pub total_tickets: u32,
    pub completed: u32,
    pub failed: u32,
    pub status: OperationStatus,
    pub results: Vec<RowResult>,
    pub error: Option<String>,
}

/// Merged completion counters.
///
/// `completed + failed` never exceeds `total` and never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub completed: u32,
    pub failed: u32,
    pub total: u32,
}

impl Tally {
    pub fn done(&self) -> u32 {
        self.completed + self.failed
    }

    pub fn percentage(&self) -> u32 {
        progress_percentage(self.done(), self.total)
    }

    fn absorb(&mut self, total: u32, completed: u32, failed: u32) {
        let total = total.max(self.total);
        let completed = completed.min(total);
        let failed = failed.min(total - completed);
        let candidate = Tally {
            completed,
            failed,
            total,
        };
        if candidate.done() >= self.done() {
            *self = candidate;
        } else {
            importer_debug!(
                "ignoring regressed tally {}/{} (have {}/{})",
                candidate.done(),
                total,
                self.done(),
                self.total
            );
            self.total = total;
        }
    }
}

/// `round(100 * done / total)`, rounding halves up; zero when `total` is zero.
pub fn progress_percentage(done: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let total = u64::from(total);
    let done = u64::from(done).min(total);
    ((done * 200 + total) / (total * 2)) as u32
}

/// Final tally shown once a run reaches a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSummary {
    pub completed: u32,
    pub failed: u32,
    pub total: u32,
}

impl From<Tally> for CompletionSummary {
    fn from(tally: Tally) -> Self {
        Self {
            completed: tally.completed,
            failed: tally.failed,
            total: tally.total,
        }
    }
}

impl fmt::Display for CompletionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully created: {} tickets, Failed: {}, Total: {}",
            self.completed, self.failed, self.total
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationPhase {
    #[default]
    Idle,
    Starting,
    Polling,
    Completed,
    /// The server reported the whole run as failed.
    Failed,
    /// Polling was abandoned after too many consecutive failures.
    Stalled,
}

impl OperationPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationPhase::Completed | OperationPhase::Failed | OperationPhase::Stalled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// `None` keeps polling through failures indefinitely.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: Some(DEFAULT_MAX_CONSECUTIVE_POLL_FAILURES),
        }
    }
}

/// Result of beginning a start attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StartTicket {
    pub handle: PollHandle,
    /// Loop of the previous run that must be cancelled first.
    pub superseded: Option<PollHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    Stale,
    Polling {
        handle: PollHandle,
        operation_id: OperationId,
    },
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Stale,
    Merged,
    Failed(String),
    Stalled { handle: PollHandle, failures: u32 },
    Finished {
        handle: PollHandle,
        summary: CompletionSummary,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Orchestrator {
    phase: OperationPhase,
    last_handle: u64,
    handle: Option<PollHandle>,
    operation_id: Option<OperationId>,
    rows: BTreeMap<u32, RowResult>,
    tally: Tally,
    summary: Option<CompletionSummary>,
    consecutive_failures: u32,
    policy: PollPolicy,
}

impl Orchestrator {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> OperationPhase {
        self.phase
    }

    pub fn poll_handle(&self) -> Option<PollHandle> {
        self.handle
    }

    /// Handle of the loop that is live right now, if any.
    pub fn live_loop(&self) -> Option<PollHandle> {
        match self.phase {
            OperationPhase::Polling => self.handle,
            _ => None,
        }
    }

    pub fn operation_id(&self) -> Option<&OperationId> {
        self.operation_id.as_ref()
    }

    pub fn rows(&self) -> impl Iterator<Item = &RowResult> {
        self.rows.values()
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn summary(&self) -> Option<CompletionSummary> {
        self.summary
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Drops the current run and mints a handle for a new one.
    pub(crate) fn begin_start(&mut self) -> StartTicket {
        let superseded = self.clear_run();
        self.last_handle += 1;
        let handle = PollHandle(self.last_handle);
        self.handle = Some(handle);
        self.phase = OperationPhase::Starting;
        importer_info!("starting batch operation ({})", handle);
        StartTicket { handle, superseded }
    }

    pub(crate) fn on_started(
        &mut self,
        handle: PollHandle,
        result: Result<StartedRun, String>,
    ) -> StartOutcome {
        if self.phase != OperationPhase::Starting || self.handle != Some(handle) {
            importer_debug!("ignoring start response for stale {}", handle);
            return StartOutcome::Stale;
        }
        match result {
            Ok(StartedRun {
                operation_id,
                total_tickets,
            }) => {
                importer_info!("operation {} started ({})", operation_id, handle);
                if let Some(total) = total_tickets {
                    self.tally.absorb(total, 0, 0);
                }
                self.operation_id = Some(operation_id.clone());
                self.phase = OperationPhase::Polling;
                StartOutcome::Polling {
                    handle,
                    operation_id,
                }
            }
            Err(message) => {
                importer_warn!("operation start failed: {}", message);
                self.handle = None;
                self.phase = OperationPhase::Idle;
                StartOutcome::Rejected(message)
            }
        }
    }

    pub(crate) fn on_poll(
        &mut self,
        handle: PollHandle,
        result: Result<OperationSnapshot, String>,
    ) -> PollOutcome {
        if self.phase != OperationPhase::Polling || self.handle != Some(handle) {
            importer_debug!("dropping snapshot from stale {}", handle);
            return PollOutcome::Stale;
        }

        let snapshot = match result {
            Ok(snapshot) if self.operation_id.as_ref() == Some(&snapshot.operation_id) => snapshot,
            Ok(snapshot) => {
                let message = format!(
                    "status report for unknown operation {}",
                    snapshot.operation_id
                );
                return self.record_failure(handle, message);
            }
            Err(message) => return self.record_failure(handle, message),
        };

        self.consecutive_failures = 0;
        self.merge(&snapshot);

        match snapshot.status {
            OperationStatus::Running => PollOutcome::Merged,
            OperationStatus::Completed | OperationStatus::Failed => {
                let summary = CompletionSummary::from(self.tally);
                self.summary = Some(summary);
                let error = if snapshot.status == OperationStatus::Failed {
                    self.phase = OperationPhase::Failed;
                    Some(
                        snapshot
                            .error
                            .unwrap_or_else(|| "the server reported a failure".to_string()),
                    )
                } else {
                    self.phase = OperationPhase::Completed;
                    None
                };
                importer_info!("operation finished: {}", summary);
                PollOutcome::Finished {
                    handle,
                    summary,
                    error,
                }
            }
        }
    }

    fn record_failure(&mut self, handle: PollHandle, message: String) -> PollOutcome {
        self.consecutive_failures += 1;
        importer_warn!(
            "status poll failed ({} in a row): {}",
            self.consecutive_failures,
            message
        );
        if let Some(max) = self.policy.max_consecutive_failures {
            if self.consecutive_failures >= max.max(1) {
                self.phase = OperationPhase::Stalled;
                return PollOutcome::Stalled {
                    handle,
                    failures: self.consecutive_failures,
                };
            }
        }
        PollOutcome::Failed(message)
    }

    /// Returns the loop that must be cancelled, if one was live.
    pub(crate) fn reset(&mut self) -> Option<PollHandle> {
        let cancelled = self.clear_run();
        self.phase = OperationPhase::Idle;
        cancelled
    }

    fn clear_run(&mut self) -> Option<PollHandle> {
        let live = self.live_loop();
        self.handle = None;
        self.operation_id = None;
        self.rows.clear();
        self.tally = Tally::default();
        self.summary = None;
        self.consecutive_failures = 0;
        live
    }

    fn merge(&mut self, snapshot: &OperationSnapshot) {
        for incoming in &snapshot.results {
            if let Some(existing) = self.rows.get(&incoming.row) {
                if existing.status.is_terminal() && !incoming.status.is_terminal() {
                    importer_debug!("row {} stays {:?}", incoming.row, existing.status);
                    continue;
                }
            }
            self.rows.insert(incoming.row, incoming.clone());
        }
        self.tally
            .absorb(snapshot.total_tickets, snapshot.completed, snapshot.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        id: &str,
        total: u32,
        completed: u32,
        failed: u32,
        status: OperationStatus,
        results: Vec<RowResult>,
    ) -> OperationSnapshot {
        OperationSnapshot {
            operation_id: OperationId::new(id),
            total_tickets: total,
            completed,
            failed,
            status,
            results,
            error: None,
        }
    }

    fn polling(orchestrator: &mut Orchestrator, id: &str) -> PollHandle {
        let ticket = orchestrator.begin_start();
        orchestrator.on_started(ticket.handle, Ok(OperationId::new(id).into()));
        ticket.handle
    }

    #[test]
    fn percentage_rounds_half_up_and_handles_zero() {
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(5, 0), 0);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
        assert_eq!(progress_percentage(1, 8), 13);
        assert_eq!(progress_percentage(3, 3), 100);
        assert_eq!(progress_percentage(9, 3), 100);
    }

    #[test]
    fn tally_is_monotonic_and_bounded() {
        let mut tally = Tally::default();
        let feed = [(3, 1, 0), (3, 0, 0), (3, 5, 5), (2, 1, 1), (3, 2, 1)];
        let mut last_done = 0;
        for (total, completed, failed) in feed {
            tally.absorb(total, completed, failed);
            assert!(tally.done() >= last_done);
            assert!(tally.done() <= tally.total);
            last_done = tally.done();
        }
        assert_eq!(tally.total, 3);
        assert_eq!(tally.done(), 3);
    }

    #[test]
    fn terminal_rows_never_regress() {
        let mut orchestrator = Orchestrator::default();
        let handle = polling(&mut orchestrator, "op-1");

        orchestrator.on_poll(
            handle,
            Ok(snapshot(
                "op-1",
                2,
                1,
                0,
                OperationStatus::Running,
                vec![RowResult::created(1, "A", "PROJ-1")],
            )),
        );
        orchestrator.on_poll(
            handle,
            Ok(snapshot(
                "op-1",
                2,
                1,
                0,
                OperationStatus::Running,
                vec![
                    RowResult::processing(1, "A"),
                    RowResult::processing(2, "B"),
                ],
            )),
        );

        let rows: Vec<_> = orchestrator.rows().cloned().collect();
        assert_eq!(
            rows,
            vec![
                RowResult::created(1, "A", "PROJ-1"),
                RowResult::processing(2, "B")
            ]
        );
    }

    #[test]
    fn later_snapshot_supersedes_row() {
        let mut orchestrator = Orchestrator::default();
        let handle = polling(&mut orchestrator, "op-1");
        orchestrator.on_poll(
            handle,
            Ok(snapshot(
                "op-1",
                1,
                0,
                0,
                OperationStatus::Running,
                vec![RowResult::processing(1, "A")],
            )),
        );
        orchestrator.on_poll(
            handle,
            Ok(snapshot(
                "op-1",
                1,
                0,
                1,
                OperationStatus::Running,
                vec![RowResult::failed(1, "A", "Priority is invalid")],
            )),
        );
        let row = orchestrator.rows().next().unwrap();
        assert_eq!(row.detail(), "Failed: Priority is invalid");
    }

    #[test]
    fn snapshot_for_other_operation_counts_as_failure() {
        let mut orchestrator = Orchestrator::default();
        let handle = polling(&mut orchestrator, "op-1");
        let outcome = orchestrator.on_poll(
            handle,
            Ok(snapshot(
                "op-0",
                1,
                1,
                0,
                OperationStatus::Completed,
                vec![RowResult::created(1, "A", "PROJ-1")],
            )),
        );
        assert_eq!(
            outcome,
            PollOutcome::Failed("status report for unknown operation op-0".into())
        );
        assert_eq!(orchestrator.phase(), OperationPhase::Polling);
        assert_eq!(orchestrator.consecutive_failures(), 1);
        assert_eq!(orchestrator.rows().count(), 0);
        assert_eq!(orchestrator.tally(), Tally::default());
    }

    #[test]
    fn failures_stall_after_policy_limit() {
        let mut orchestrator = Orchestrator::new(PollPolicy {
            max_consecutive_failures: Some(3),
        });
        let handle = polling(&mut orchestrator, "op-1");

        assert_eq!(
            orchestrator.on_poll(handle, Err("timeout".into())),
            PollOutcome::Failed("timeout".into())
        );
        // A success in between resets the streak.
        orchestrator.on_poll(
            handle,
            Ok(snapshot("op-1", 1, 0, 0, OperationStatus::Running, vec![])),
        );
        orchestrator.on_poll(handle, Err("timeout".into()));
        orchestrator.on_poll(handle, Err("timeout".into()));
        assert_eq!(
            orchestrator.on_poll(handle, Err("timeout".into())),
            PollOutcome::Stalled {
                handle,
                failures: 3
            }
        );
        assert_eq!(orchestrator.phase(), OperationPhase::Stalled);
        assert_eq!(orchestrator.live_loop(), None);
    }

    #[test]
    fn unlimited_policy_keeps_polling() {
        let mut orchestrator = Orchestrator::new(PollPolicy {
            max_consecutive_failures: None,
        });
        let handle = polling(&mut orchestrator, "op-1");
        for _ in 0..500 {
            assert!(matches!(
                orchestrator.on_poll(handle, Err("down".into())),
                PollOutcome::Failed(_)
            ));
        }
        assert_eq!(orchestrator.live_loop(), Some(handle));
    }

    #[test]
    fn new_start_supersedes_live_loop() {
        let mut orchestrator = Orchestrator::default();
        let first = polling(&mut orchestrator, "op-1");
        let ticket = orchestrator.begin_start();
        assert_eq!(ticket.superseded, Some(first));
        assert_ne!(ticket.handle, first);
        assert_eq!(orchestrator.live_loop(), None);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut orchestrator = Orchestrator::default();
        let handle = polling(&mut orchestrator, "op-1");
        assert_eq!(orchestrator.reset(), Some(handle));
        assert_eq!(orchestrator.reset(), None);
        assert_eq!(orchestrator.phase(), OperationPhase::Idle);
        assert_eq!(orchestrator.operation_id(), None);
    }

    #[test]
    fn summary_text() {
        let summary = CompletionSummary {
            completed: 2,
            failed: 1,
            total: 3,
        };
        assert_eq!(
            summary.to_string(),
            "Successfully created: 2 tickets, Failed: 1, Total: 3"
        );
    }
}
