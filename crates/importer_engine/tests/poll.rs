use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use importer_engine::{
    EngineEvent, EventSink, FailureKind, HealthReport, LoopId, ParsedPreview, PollLoop,
    PollSupervisor, ReportStatus, ServiceError, StartedOperation, StatusReport, TicketDetails,
    TicketService,
};
use tokio::time::Instant;

/// Serves scripted poll responses, then `running` forever.
struct ScriptedService {
    script: Mutex<VecDeque<Result<ReportStatus, ServiceError>>>,
    latency: Duration,
    started: Instant,
    calls: Mutex<Vec<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    reported_id: Option<String>,
}

impl ScriptedService {
    fn new(script: Vec<Result<ReportStatus, ServiceError>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            latency,
            started: Instant::now(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            reported_id: None,
        })
    }

    /// Like `new`, but every report names `operation_id` instead of the
    /// operation that was asked for.
    fn reporting_as(
        script: Vec<Result<ReportStatus, ServiceError>>,
        operation_id: &str,
    ) -> Arc<Self> {
        let mut service = Self::new(script, Duration::ZERO);
        if let Some(service) = Arc::get_mut(&mut service) {
            service.reported_id = Some(operation_id.to_string());
        }
        service
    }

    fn call_times(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

fn report(operation_id: &str, status: ReportStatus) -> StatusReport {
    StatusReport {
        operation_id: operation_id.to_string(),
        total_tickets: 1,
        completed: u32::from(status == ReportStatus::Completed),
        failed: 0,
        status,
        results: Vec::new(),
        error: None,
    }
}

#[async_trait::async_trait]
impl TicketService for ScriptedService {
    async fn upload(&self, _: &str, _: Bytes) -> Result<ParsedPreview, ServiceError> {
        unimplemented!()
    }

    async fn start_operation(&self, _: &str) -> Result<StartedOperation, ServiceError> {
        unimplemented!()
    }

    async fn poll_status(&self, operation_id: &str) -> Result<StatusReport, ServiceError> {
        self.calls.lock().unwrap().push(self.started.elapsed());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ReportStatus::Running));
        let reported = self.reported_id.as_deref().unwrap_or(operation_id);
        next.map(|status| report(reported, status))
    }

    async fn fetch_ticket(&self, _: &str) -> Result<TicketDetails, ServiceError> {
        unimplemented!()
    }

    async fn check_health(&self) -> Result<HealthReport, ServiceError> {
        unimplemented!()
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    fn loop_ids(&self) -> Vec<LoopId> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::StatusPolled { loop_id, .. } => Some(*loop_id),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn poll_loop(
    loop_id: LoopId,
    service: Arc<ScriptedService>,
    sink: Arc<RecordingSink>,
    supervisor: Arc<PollSupervisor>,
) -> PollLoop {
    PollLoop {
        loop_id,
        operation_id: format!("op-{loop_id}"),
        period: Duration::from_secs(1),
        service,
        sink,
        supervisor,
    }
}

#[tokio::test(start_paused = true)]
async fn polls_once_per_period_and_stops_on_completion() {
    let service = ScriptedService::new(
        vec![
            Ok(ReportStatus::Running),
            Ok(ReportStatus::Running),
            Ok(ReportStatus::Completed),
        ],
        Duration::ZERO,
    );
    let sink = Arc::new(RecordingSink::default());
    let supervisor = Arc::new(PollSupervisor::new());
    let token = supervisor.install(1);

    poll_loop(1, service.clone(), sink.clone(), supervisor.clone())
        .run(token)
        .await;

    let seconds: Vec<_> = service.call_times().iter().map(|d| d.as_secs()).collect();
    assert_eq!(seconds, vec![1, 2, 3]);
    assert_eq!(sink.loop_ids(), vec![1, 1, 1]);
    assert_eq!(supervisor.active(), None);

    // Nothing more is requested after the terminal status.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.call_times().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_responses_never_overlap() {
    let mut script: Vec<_> = (0..4).map(|_| Ok(ReportStatus::Running)).collect();
    script.push(Ok(ReportStatus::Completed));
    let service = ScriptedService::new(script, Duration::from_millis(2_500));
    let sink = Arc::new(RecordingSink::default());
    let supervisor = Arc::new(PollSupervisor::new());
    let token = supervisor.install(1);

    poll_loop(1, service.clone(), sink.clone(), supervisor)
        .run(token)
        .await;

    assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
    let times = service.call_times();
    assert_eq!(times.len(), 5);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(2_500));
    }
}

#[tokio::test(start_paused = true)]
async fn failures_keep_the_loop_running() {
    let service = ScriptedService::new(
        vec![
            Err(ServiceError::new(FailureKind::Network, "connection refused")),
            Err(ServiceError::new(FailureKind::Timeout, "timed out")),
            Ok(ReportStatus::Completed),
        ],
        Duration::ZERO,
    );
    let sink = Arc::new(RecordingSink::default());
    let supervisor = Arc::new(PollSupervisor::new());
    let token = supervisor.install(1);

    poll_loop(1, service.clone(), sink.clone(), supervisor)
        .run(token)
        .await;

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[0],
        EngineEvent::StatusPolled { result: Err(err), .. } if err.kind == FailureKind::Network
    ));
    assert!(matches!(
        &events[2],
        EngineEvent::StatusPolled { result: Ok(report), .. } if report.status == ReportStatus::Completed
    ));
}

#[tokio::test(start_paused = true)]
async fn terminal_report_for_another_operation_keeps_polling() {
    let service = ScriptedService::reporting_as(
        vec![Ok(ReportStatus::Completed), Ok(ReportStatus::Completed)],
        "OP-1",
    );
    let sink = Arc::new(RecordingSink::default());
    let supervisor = Arc::new(PollSupervisor::new());
    let token = supervisor.install(1);

    let task = tokio::spawn(
        poll_loop(1, service.clone(), sink.clone(), supervisor.clone()).run(token.clone()),
    );
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(supervisor.active(), Some(1));

    token.cancel();
    task.await.unwrap();
    assert_eq!(sink.loop_ids(), vec![1, 1, 1]);
    assert_eq!(service.call_times().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn superseded_loop_emits_nothing() {
    let service = ScriptedService::new(Vec::new(), Duration::ZERO);
    let sink = Arc::new(RecordingSink::default());
    let supervisor = Arc::new(PollSupervisor::new());

    let first_token = supervisor.install(1);
    let first = tokio::spawn(
        poll_loop(1, service.clone(), sink.clone(), supervisor.clone()).run(first_token),
    );
    let second_token = supervisor.install(2);
    let second = tokio::spawn(
        poll_loop(2, service.clone(), sink.clone(), supervisor.clone()).run(second_token),
    );

    first.await.unwrap();
    // The stale loop's exit must not clear the live loop's slot.
    assert_eq!(supervisor.active(), Some(2));

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(sink.loop_ids(), vec![2, 2, 2]);

    assert!(supervisor.cancel(2));
    second.await.unwrap();
    assert_eq!(supervisor.active(), None);
    let polls = service.call_times().len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(service.call_times().len(), polls);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_request_drops_the_response() {
    let service = ScriptedService::new(
        vec![Ok(ReportStatus::Completed)],
        Duration::from_millis(500),
    );
    let sink = Arc::new(RecordingSink::default());
    let supervisor = Arc::new(PollSupervisor::new());
    let token = supervisor.install(1);
    let task = tokio::spawn(
        poll_loop(1, service.clone(), sink.clone(), supervisor.clone()).run(token),
    );

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(service.in_flight.load(Ordering::SeqCst), 1);
    supervisor.cancel(1);
    task.await.unwrap();

    assert!(sink.loop_ids().is_empty());
}
