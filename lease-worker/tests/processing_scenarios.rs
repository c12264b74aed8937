use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use lease_worker::{
    AlertSeverity, Consumer, Disposition, DispatchError, HandlerRegistry, Lease, LiveTelemetry, MessageId,
    OutcomeStatus, OutcomeStore, PoisonDisposition, ProcessingOutcome, PoisonHandler, ProcessingError, QueueError, QueueMessage,
    QueueResult, QueueTransport, Receipt, RenewalSchedule, Task, TaskProcessor, WorkerConfig,
    codec::encode_task,
    store::memory::MemoryOutcomeStore,
    transport::memory::MemoryTransport,
};

/// Shared journal of transport calls and handler milestones
type Journal = Arc<Mutex<Vec<&'static str>>>;

/// Memory transport that journals renew/delete calls and can fail renewals
struct RecordingTransport {
    inner: MemoryTransport,
    journal: Journal,
    failing_renewals: Mutex<u32>,
}

impl RecordingTransport {
    fn new(journal: Journal) -> Self {
        Self {
            inner: MemoryTransport::new(),
            journal,
            failing_renewals: Mutex::new(0),
        }
    }

    fn fail_next_renewals(&self, count: u32) {
        *self.failing_renewals.lock() = count;
    }
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn enqueue(&self, queue: &str, body: String) -> QueueResult<MessageId> {
        self.inner.enqueue(queue, body).await
    }

    async fn dequeue(&self, queue: &str, visibility: Duration) -> QueueResult<Option<QueueMessage>> {
        self.inner.dequeue(queue, visibility).await
    }

    async fn renew(&self, lease: &Lease, extension: Duration) -> QueueResult<Receipt> {
        {
            let mut failing = self.failing_renewals.lock();
            if *failing > 0 {
                *failing -= 1;
                self.journal.lock().push("renew-failed");
                return Err(QueueError::Unavailable("injected renewal failure".to_string()));
            }
        }
        self.journal.lock().push("renew");
        self.inner.renew(lease, extension).await
    }

    async fn delete(&self, lease: &Lease) -> QueueResult<()> {
        self.journal.lock().push("delete");
        self.inner.delete(lease).await
    }

    async fn depth(&self, queue: &str) -> QueueResult<usize> {
        self.inner.depth(queue).await
    }
}

fn processor(
    transport: Arc<dyn QueueTransport>,
    registry: HandlerRegistry,
    store: &Arc<MemoryOutcomeStore>,
) -> TaskProcessor {
    TaskProcessor::new(
        transport,
        Arc::new(registry),
        store.clone(),
        Arc::new(LiveTelemetry::new()),
        Arc::new(WorkerConfig::default()),
    )
}

async fn deliver(transport: &dyn QueueTransport, task: &Task) -> QueueMessage {
    transport.enqueue("tasks", encode_task(task).unwrap()).await.unwrap();
    transport.dequeue("tasks", Duration::from_secs(120)).await.unwrap().unwrap()
}

fn report_registry(journal: Journal, work: Duration) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("GenerateReport", move |_task: Task| {
            let journal = journal.clone();
            async move {
                tokio::time::sleep(work).await;
                journal.lock().push("handler-done");
                Ok("report ready".to_string())
            }
        })
        .unwrap();
    registry
}

#[tokio::test]
async fn test_send_email_completes_on_first_attempt() {
    let transport = Arc::new(MemoryTransport::new());
    let store = Arc::new(MemoryOutcomeStore::new());
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("SendEmail", |task: Task| async move { Ok(format!("Email sent to {}", task.payload)) })
        .unwrap();
    let processor = processor(transport.clone(), registry, &store);

    let task = Task::new("SendEmail", "user@example.com");
    let message = deliver(transport.as_ref(), &task).await;
    let report = processor.process(message).await.unwrap();

    assert_eq!(report.disposition, Disposition::Succeeded);
    assert_eq!(store.upsert_count(), 1);

    let outcome = store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.attempt, 1);
    assert!(outcome.result.unwrap().contains("user@example.com"));
    assert_eq!(transport.depth("tasks").await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generate_report_renews_then_stops_before_delete() {
    let journal: Journal = Arc::default();
    let transport = Arc::new(RecordingTransport::new(journal.clone()));
    let store = Arc::new(MemoryOutcomeStore::new());
    let processor = processor(
        transport.clone(),
        report_registry(journal.clone(), Duration::from_secs(3 * 60 + 30)),
        &store,
    );

    let task = Task::new("GenerateReport", "monthly-sales");
    let message = deliver(transport.as_ref(), &task).await;
    let report = processor.process(message).await.unwrap();

    assert_eq!(*journal.lock(), vec!["renew", "renew", "renew", "handler-done", "delete"]);
    let renewal = report.renewal.unwrap();
    assert_eq!(renewal.renewals, 3);
    assert_eq!(renewal.failures, 0);

    // Nothing renews once the loop was stopped
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(journal.lock().len(), 5);

    let outcome = store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_renewal_does_not_stop_the_loop() {
    let journal: Journal = Arc::default();
    let transport = Arc::new(RecordingTransport::new(journal.clone()));
    transport.fail_next_renewals(1);
    let store = Arc::new(MemoryOutcomeStore::new());
    let processor = processor(
        transport.clone(),
        report_registry(journal.clone(), Duration::from_secs(3 * 60 + 30)),
        &store,
    );

    let task = Task::new("GenerateReport", "monthly-sales");
    let message = deliver(transport.as_ref(), &task).await;
    let report = processor.process(message).await.unwrap();

    assert_eq!(*journal.lock(), vec!["renew-failed", "renew", "renew", "handler-done", "delete"]);
    let renewal = report.renewal.unwrap();
    assert_eq!(renewal.renewals, 2);
    assert_eq!(renewal.failures, 1);
    assert_eq!(transport.depth("tasks").await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_task_type_is_failed_and_kept() {
    let journal: Journal = Arc::default();
    let transport = Arc::new(RecordingTransport::new(journal.clone()));
    let store = Arc::new(MemoryOutcomeStore::new());
    let processor = processor(transport.clone(), HandlerRegistry::new(), &store);

    let task = Task::new("Frobnicate", "{}");
    let message = deliver(transport.as_ref(), &task).await;
    let err = processor.process(message).await.unwrap_err();

    match err {
        ProcessingError::Dispatch {
            attempt,
            source: DispatchError::UnsupportedTaskType(task_type),
            ..
        } => {
            assert_eq!(attempt, 1);
            assert_eq!(task_type, "Frobnicate");
        }
        other => panic!("expected unsupported task type, got {:?}", other),
    }

    let outcome = store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(journal.lock().is_empty());
    assert_eq!(transport.depth("tasks").await.unwrap(), 1);
}

#[tokio::test]
async fn test_poison_handler_archives_raw_strings() {
    let store = Arc::new(MemoryOutcomeStore::new());
    let telemetry = Arc::new(LiveTelemetry::new());
    let handler = PoisonHandler::new(store.clone(), telemetry.clone(), 5);

    let transport = MemoryTransport::new();
    transport.enqueue("tasks-poison", "just some text".to_string()).await.unwrap();
    let message = transport.dequeue("tasks-poison", Duration::from_secs(30)).await.unwrap().unwrap();

    let disposition = handler.handle(&message).await.unwrap();

    assert_eq!(disposition, PoisonDisposition::Archived);
    let archived = store.archived().await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].body, "just some text");
    assert_eq!(archived[0].message_id, message.message_id);

    let alerts = telemetry.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
}

#[tokio::test(start_paused = true)]
async fn test_failing_task_ends_up_poisoned() {
    let transport = Arc::new(MemoryTransport::new());
    let store = Arc::new(MemoryOutcomeStore::new());
    let telemetry = Arc::new(LiveTelemetry::new());

    let config = WorkerConfig::default()
        .with_visibility_timeout(Duration::from_secs(10))
        .with_renewal(RenewalSchedule::new(Duration::from_secs(8), Duration::from_secs(4)).unwrap())
        .with_poll_interval(Duration::from_secs(1));
    let consumer = Consumer::new(
        transport.clone(),
        Arc::new(HandlerRegistry::new()),
        store.clone(),
        telemetry.clone(),
        config,
    )
    .unwrap();

    let task = Task::new("Frobnicate", "{}");
    transport.enqueue("tasks", encode_task(&task).unwrap()).await.unwrap();

    let handle = consumer.start();
    tokio::time::sleep(Duration::from_secs(120)).await;
    handle.shutdown().await.unwrap();

    let outcome = store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Poisoned);
    assert_eq!(outcome.attempt, 5);

    assert_eq!(telemetry.metrics().failed(), 5);
    assert_eq!(telemetry.metrics().poisoned(), 1);
    assert!(telemetry.alerts().iter().any(|a| a.severity == AlertSeverity::Critical));
    assert_eq!(transport.depth("tasks").await.unwrap(), 0);
    assert_eq!(transport.depth("tasks-poison").await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_attempts_keep_one_whole_record() {
    let store = Arc::new(MemoryOutcomeStore::new());
    let task = Task::new("GenerateReport", "monthly-sales");

    for _ in 0..50 {
        let first = ProcessingOutcome::failed(&task, "worker lost its lease".to_string(), 1, Duration::from_secs(3));
        let second = ProcessingOutcome::completed(&task, "report ready".to_string(), 2, Duration::from_secs(200));

        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let writers: Vec<_> = [first.clone(), second.clone()]
            .into_iter()
            .map(|outcome| {
                let store = store.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    store.upsert(outcome).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let stored = store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
        assert!(stored == first || stored == second, "torn record: {:?}", stored);
        assert_eq!(store.list(task.submission_date()).await.unwrap().len(), 1);
    }
}
