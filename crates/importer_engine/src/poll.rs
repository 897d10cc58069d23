//! Status poll loops.
//!
//! At most one loop is live at a time. The supervisor holds the live loop's
//! id and cancellation token; installing a new loop cancels the previous one
//! under the same lock, so two loops can never both believe they are current.

use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use importer_logging::{importer_debug, importer_info};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{EngineEvent, LoopId, StatusReport, TicketService};

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Default)]
pub struct PollSupervisor {
    slot: Mutex<Option<(LoopId, CancellationToken)>>,
}

impl PollSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<(LoopId, CancellationToken)>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `loop_id` the live loop, cancelling whichever loop held the slot.
    pub fn install(&self, loop_id: LoopId) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.slot().replace((loop_id, token.clone()));
        if let Some((old_id, old_token)) = previous {
            importer_debug!("poll loop {} superseded by {}", old_id, loop_id);
            old_token.cancel();
        }
        token
    }

    /// Cancels `loop_id` if it is still the live loop.
    pub fn cancel(&self, loop_id: LoopId) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some((live, token)) if *live == loop_id => {
                token.cancel();
                *slot = None;
                importer_debug!("poll loop {} cancelled", loop_id);
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) {
        if let Some((loop_id, token)) = self.slot().take() {
            importer_debug!("poll loop {} cancelled on shutdown", loop_id);
            token.cancel();
        }
    }

    pub fn active(&self) -> Option<LoopId> {
        self.slot().as_ref().map(|(loop_id, _)| *loop_id)
    }

    /// Clears the slot when a loop ends on its own. A loop that has already
    /// been replaced leaves the slot alone.
    pub fn release(&self, loop_id: LoopId) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|(live, _)| *live == loop_id) {
            *slot = None;
        }
    }
}

/// One sequential poll loop for a started operation.
pub struct PollLoop {
    pub loop_id: LoopId,
    pub operation_id: String,
    pub period: Duration,
    pub service: Arc<dyn TicketService>,
    pub sink: Arc<dyn EventSink>,
    pub supervisor: Arc<PollSupervisor>,
}

impl PollLoop {
    /// Polls once per period, first one period after the call, with never
    /// more than one request in flight. Ends on a terminal status for this
    /// loop's operation or on cancellation; nothing is emitted once `token`
    /// is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let period = self.period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        importer_info!(
            "poll loop {} started for operation {}",
            self.loop_id,
            self.operation_id
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.service.poll_status(&self.operation_id) => result,
            };
            if token.is_cancelled() {
                break;
            }

            let terminal = matches!(&result, Ok(report) if self.finishes(report));
            self.sink.emit(EngineEvent::StatusPolled {
                loop_id: self.loop_id,
                result,
            });
            if terminal {
                importer_info!("poll loop {} reached a terminal status", self.loop_id);
                break;
            }
        }

        self.supervisor.release(self.loop_id);
        importer_debug!("poll loop {} exited", self.loop_id);
    }

    /// A terminal report only ends the loop when it is about this operation.
    fn finishes(&self, report: &StatusReport) -> bool {
        report.status.is_terminal() && report.operation_id == self.operation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_cancels_previous_loop() {
        let supervisor = PollSupervisor::new();
        let first = supervisor.install(1);
        let second = supervisor.install(2);

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(supervisor.active(), Some(2));
    }

    #[test]
    fn stale_release_and_cancel_are_noops() {
        let supervisor = PollSupervisor::new();
        supervisor.install(1);
        let live = supervisor.install(2);

        supervisor.release(1);
        assert!(!supervisor.cancel(1));
        assert_eq!(supervisor.active(), Some(2));
        assert!(!live.is_cancelled());

        assert!(supervisor.cancel(2));
        assert!(live.is_cancelled());
        assert!(!supervisor.cancel(2));
        assert_eq!(supervisor.active(), None);
    }
}
