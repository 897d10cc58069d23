use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use importer_logging::importer_debug;

use crate::poll::{ChannelEventSink, EventSink, PollLoop, PollSupervisor};
use crate::service::{ReqwestTicketService, ServiceSettings, TicketService};
use crate::{EngineEvent, LoopId, RequestId, ServiceError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

enum EngineCommand {
    Upload {
        request_id: RequestId,
        file_name: String,
        bytes: Bytes,
    },
    StartOperation {
        loop_id: LoopId,
        preview_id: String,
    },
    StartPolling {
        loop_id: LoopId,
        operation_id: String,
    },
    StopPolling {
        loop_id: LoopId,
    },
    Lookup {
        request_id: RequestId,
        key: String,
    },
    CheckHealth,
}

/// Runs service calls on a background tokio runtime. Commands go in through
/// the handle's methods, results come back as [`EngineEvent`]s.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    supervisor: Arc<PollSupervisor>,
}

impl EngineHandle {
    pub fn new(settings: ServiceSettings, poll_interval: Duration) -> Result<Self, EngineError> {
        let service = Arc::new(ReqwestTicketService::new(settings)?);
        Self::with_service(service, poll_interval)
    }

    pub fn with_service(
        service: Arc<dyn TicketService>,
        poll_interval: Duration,
    ) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("importer-engine")
            .build()?;
        let supervisor = Arc::new(PollSupervisor::new());
        let loop_supervisor = supervisor.clone();
        let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink::new(event_tx));

        thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                dispatch(
                    &runtime,
                    &service,
                    &sink,
                    &loop_supervisor,
                    poll_interval,
                    command,
                );
            }
            importer_debug!("engine command channel closed");
            loop_supervisor.cancel_all();
        });

        Ok(Self {
            cmd_tx,
            event_rx,
            supervisor,
        })
    }

    pub fn upload(
        &self,
        request_id: RequestId,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) {
        self.send(EngineCommand::Upload {
            request_id,
            file_name: file_name.into(),
            bytes: bytes.into(),
        });
    }

    pub fn start_operation(&self, loop_id: LoopId, preview_id: impl Into<String>) {
        self.send(EngineCommand::StartOperation {
            loop_id,
            preview_id: preview_id.into(),
        });
    }

    /// Starts the poll loop for `loop_id`, replacing any live loop.
    pub fn start_polling(&self, loop_id: LoopId, operation_id: impl Into<String>) {
        self.send(EngineCommand::StartPolling {
            loop_id,
            operation_id: operation_id.into(),
        });
    }

    pub fn stop_polling(&self, loop_id: LoopId) {
        self.send(EngineCommand::StopPolling { loop_id });
    }

    pub fn lookup(&self, request_id: RequestId, key: impl Into<String>) {
        self.send(EngineCommand::Lookup {
            request_id,
            key: key.into(),
        });
    }

    pub fn check_health(&self) {
        self.send(EngineCommand::CheckHealth);
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Loop currently holding the poll slot.
    pub fn active_poll(&self) -> Option<LoopId> {
        self.supervisor.active()
    }

    fn send(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }
}

// Poll slot changes happen here, on the command thread, so install and
// cancel are applied in the order the commands were sent.
fn dispatch(
    runtime: &tokio::runtime::Runtime,
    service: &Arc<dyn TicketService>,
    sink: &Arc<dyn EventSink>,
    supervisor: &Arc<PollSupervisor>,
    poll_interval: Duration,
    command: EngineCommand,
) {
    match command {
        EngineCommand::StartPolling {
            loop_id,
            operation_id,
        } => {
            let token = supervisor.install(loop_id);
            let poll = PollLoop {
                loop_id,
                operation_id,
                period: poll_interval,
                service: service.clone(),
                sink: sink.clone(),
                supervisor: supervisor.clone(),
            };
            runtime.spawn(poll.run(token));
        }
        EngineCommand::StopPolling { loop_id } => {
            supervisor.cancel(loop_id);
        }
        command => {
            let service = service.clone();
            let sink = sink.clone();
            runtime.spawn(async move {
                run_request(service.as_ref(), command, sink.as_ref()).await;
            });
        }
    }
}

async fn run_request(service: &dyn TicketService, command: EngineCommand, sink: &dyn EventSink) {
    let event = match command {
        EngineCommand::Upload {
            request_id,
            file_name,
            bytes,
        } => EngineEvent::UploadCompleted {
            request_id,
            result: service.upload(&file_name, bytes).await,
        },
        EngineCommand::StartOperation {
            loop_id,
            preview_id,
        } => EngineEvent::OperationStarted {
            loop_id,
            result: service.start_operation(&preview_id).await,
        },
        EngineCommand::Lookup { request_id, key } => EngineEvent::TicketFetched {
            request_id,
            result: service.fetch_ticket(&key).await,
        },
        EngineCommand::CheckHealth => EngineEvent::HealthChecked(service.check_health().await),
        EngineCommand::StartPolling { .. } | EngineCommand::StopPolling { .. } => return,
    };
    sink.emit(event);
}
