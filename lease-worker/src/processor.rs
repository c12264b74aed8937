//! Per-message processing: decode, classify, renew, dispatch, finalize.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, field, info, instrument, warn, Span};

use crate::{
    ProcessingError, QueueResult,
    codec::decode_task,
    config::WorkerConfig,
    dispatch::HandlerRegistry,
    lease::{Lease, LeaseRenewer, RenewalHandle, RenewalSummary},
    observability::TelemetrySink,
    store::OutcomeStore,
    tracker::DeliveryClass,
    transport::QueueTransport,
    types::{MessageId, ProcessingOutcome, QueueMessage, TaskEvent, TaskId},
};

/// Where a message is in its processing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Received,
    Decoding,
    LongRunningSetup,
    Executing,
    Finalizing,
    Succeeded,
    Failed,
}

impl ProcessingStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Decoding => "decoding",
            Self::LongRunningSetup => "long_running_setup",
            Self::Executing => "executing",
            Self::Finalizing => "finalizing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Non-error end states of [`TaskProcessor::process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handler succeeded and the message was deleted
    Succeeded,

    /// Body was not a task; the message was dropped without retry
    Undecodable,
}

/// What happened to one delivery
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub message_id: MessageId,
    pub task_id: Option<TaskId>,
    pub attempt: u32,
    pub disposition: Disposition,
    pub delivery_class: Option<DeliveryClass>,
    pub output: Option<String>,
    pub handler_duration: Option<Duration>,

    /// Set when the task ran under lease renewal
    pub renewal: Option<RenewalSummary>,
}

/// Lease held by the processor for one delivery, directly or via a renewal loop
enum LeaseGuard {
    Held(Lease),
    Renewing(RenewalHandle),
}

impl LeaseGuard {
    /// Stop renewal if running and hand back the lease with its newest receipt
    async fn release(self) -> QueueResult<(Lease, Option<RenewalSummary>)> {
        match self {
            Self::Held(lease) => Ok((lease, None)),
            Self::Renewing(handle) => {
                let (lease, summary) = handle.stop().await?;
                Ok((lease, Some(summary)))
            }
        }
    }
}

/// Processes single deliveries against the injected collaborators
#[derive(Clone)]
pub struct TaskProcessor {
    transport: Arc<dyn QueueTransport>,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn OutcomeStore>,
    telemetry: Arc<dyn TelemetrySink>,
    renewer: LeaseRenewer,
    config: Arc<WorkerConfig>,
}

impl TaskProcessor {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn OutcomeStore>,
        telemetry: Arc<dyn TelemetrySink>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            renewer: LeaseRenewer::new(transport.clone()),
            transport,
            registry,
            store,
            telemetry,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process one delivery.
    ///
    /// `Err` means the task failed or could not be acknowledged and the
    /// message must be left for redelivery. Undecodable bodies are not an
    /// error: they are reported and deleted, never retried.
    #[instrument(
        name = "process_message",
        skip_all,
        fields(
            message_id = %message.message_id,
            attempt = message.dequeue_count,
            task_id = tracing::field::Empty,
            task_type = tracing::field::Empty,
            stage = tracing::field::Empty,
        )
    )]
    pub async fn process(&self, message: QueueMessage) -> Result<ProcessReport, ProcessingError> {
        let attempt = message.dequeue_count;
        enter_stage(ProcessingStage::Received);

        enter_stage(ProcessingStage::Decoding);
        let task = match decode_task(&message.body) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, body_size = message.body_size(), "Message body is not a task, dropping it");
                if let Err(delete_error) = self.transport.delete(&message.lease()).await {
                    warn!(error = %delete_error, "Failed to delete undecodable message");
                }
                self.telemetry.record(TaskEvent::DecodeRejected {
                    message_id: message.message_id.clone(),
                    reason: e.to_string(),
                    at: Utc::now(),
                });
                return Ok(ProcessReport {
                    message_id: message.message_id,
                    task_id: None,
                    attempt,
                    disposition: Disposition::Undecodable,
                    delivery_class: None,
                    output: None,
                    handler_duration: None,
                    renewal: None,
                });
            }
        };

        let span = Span::current();
        span.record("task_id", field::display(&task.id));
        span.record("task_type", task.task_type.as_str());

        let class = self.config.retry.classify(attempt);
        match class {
            DeliveryClass::Normal => debug!("Executing task"),
            DeliveryClass::Warn => warn!(
                max_attempts = self.config.retry.max_attempts(),
                "Task has been delivered several times"
            ),
            DeliveryClass::Terminal => error!(
                max_attempts = self.config.retry.max_attempts(),
                "Final delivery attempt before poison routing"
            ),
        }

        let lease = message.lease();
        let guard = if self.config.is_long_running(&task.task_type) {
            enter_stage(ProcessingStage::LongRunningSetup);
            LeaseGuard::Renewing(self.renewer.start(lease, self.config.renewal))
        } else {
            LeaseGuard::Held(lease)
        };

        enter_stage(ProcessingStage::Executing);
        let result = self.registry.dispatch(&task).await;

        enter_stage(ProcessingStage::Finalizing);
        let released = guard.release().await;

        match result {
            Ok(dispatched) => {
                let (renewal, ack) = match released {
                    Ok((lease, renewal)) => (renewal, self.transport.delete(&lease).await),
                    Err(e) => (None, Err(e)),
                };

                self.persist(ProcessingOutcome::completed(&task, dispatched.output.clone(), attempt, dispatched.duration))
                    .await;
                self.telemetry.record(TaskEvent::Completed {
                    task_id: task.id.clone(),
                    task_type: task.task_type.clone(),
                    attempt,
                    at: Utc::now(),
                });
                self.telemetry.record_duration(&task.task_type, dispatched.duration);

                if let Err(source) = ack {
                    enter_stage(ProcessingStage::Failed);
                    warn!(error = %source, "Task completed but the message could not be deleted");
                    return Err(ProcessingError::Acknowledge {
                        task_id: task.id,
                        attempt,
                        source,
                    });
                }

                enter_stage(ProcessingStage::Succeeded);
                info!(duration = ?dispatched.duration, "Task completed");
                Ok(ProcessReport {
                    message_id: message.message_id,
                    task_id: Some(task.id),
                    attempt,
                    disposition: Disposition::Succeeded,
                    delivery_class: Some(class),
                    output: Some(dispatched.output),
                    handler_duration: Some(dispatched.duration),
                    renewal,
                })
            }
            Err(source) => {
                enter_stage(ProcessingStage::Failed);
                if let Err(e) = released {
                    warn!(error = %e, "Lost the lease while stopping renewal");
                }

                let duration = source.duration().unwrap_or_default();
                self.persist(ProcessingOutcome::failed(&task, source.to_string(), attempt, duration))
                    .await;
                self.telemetry.record(TaskEvent::Failed {
                    task_id: task.id.clone(),
                    task_type: task.task_type.clone(),
                    attempt,
                    error: source.to_string(),
                    at: Utc::now(),
                });
                if let Some(duration) = source.duration() {
                    self.telemetry.record_duration(&task.task_type, duration);
                }

                warn!(error = %source, "Task failed, leaving message for redelivery");
                Err(ProcessingError::Dispatch {
                    task_id: task.id,
                    attempt,
                    source,
                })
            }
        }
    }

    /// Store failures are logged and never change the processing result
    async fn persist(&self, outcome: ProcessingOutcome) {
        let status = outcome.status;
        if let Err(e) = self.store.upsert(outcome).await {
            error!(error = %e, status = status.name(), "Failed to persist processing outcome");
        }
    }
}

fn enter_stage(stage: ProcessingStage) {
    Span::current().record("stage", stage.name());
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::{
        DispatchError, TaskError,
        codec::encode_task,
        observability::LiveTelemetry,
        store::memory::MemoryOutcomeStore,
        transport::memory::MemoryTransport,
        types::{OutcomeStatus, Task},
    };
    use tracing_test::traced_test;

    struct Harness {
        transport: Arc<MemoryTransport>,
        store: Arc<MemoryOutcomeStore>,
        telemetry: Arc<LiveTelemetry>,
        processor: TaskProcessor,
    }

    fn harness(transport: MemoryTransport, registry: HandlerRegistry) -> Harness {
        let transport = Arc::new(transport);
        let store = Arc::new(MemoryOutcomeStore::new());
        let telemetry = Arc::new(LiveTelemetry::new());
        let processor = TaskProcessor::new(
            transport.clone(),
            Arc::new(registry),
            store.clone(),
            telemetry.clone(),
            Arc::new(WorkerConfig::default()),
        );
        Harness {
            transport,
            store,
            telemetry,
            processor,
        }
    }

    fn echo_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("SendEmail", |task: Task| async move { Ok(format!("sent to {}", task.payload)) })
            .unwrap();
        registry
    }

    async fn deliver(transport: &MemoryTransport, body: String) -> QueueMessage {
        transport.enqueue("tasks", body).await.unwrap();
        transport.dequeue("tasks", Duration::from_secs(120)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_success_deletes_and_records() {
        let h = harness(MemoryTransport::new(), echo_registry());
        let task = Task::new("SendEmail", "user@example.com");
        let message = deliver(&h.transport, encode_task(&task).unwrap()).await;
        let message_id = message.message_id.clone();

        let report = h.processor.process(message).await.unwrap();

        assert_eq!(report.disposition, Disposition::Succeeded);
        assert_eq!(report.output.as_deref(), Some("sent to user@example.com"));
        assert!(report.renewal.is_none());
        assert!(!h.transport.contains("tasks", &message_id));

        let outcome = h.store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.attempt, 1);
        assert_eq!(h.telemetry.metrics().completed(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_is_dropped_not_failed() {
        let h = harness(MemoryTransport::new(), echo_registry());
        let message = deliver(&h.transport, "definitely not a task".to_string()).await;
        let message_id = message.message_id.clone();

        let report = h.processor.process(message).await.unwrap();

        assert_eq!(report.disposition, Disposition::Undecodable);
        assert!(report.task_id.is_none());
        assert!(!h.transport.contains("tasks", &message_id));
        assert_eq!(h.telemetry.metrics().decode_rejected(), 1);
        assert_eq!(h.store.upsert_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_is_not_redelivered() {
        let h = harness(MemoryTransport::new(), echo_registry());
        h.transport.enqueue("tasks", "garbage!!".to_string()).await.unwrap();
        let message = h.transport.dequeue("tasks", Duration::from_secs(1)).await.unwrap().unwrap();

        let report = h.processor.process(message).await.unwrap();
        assert_eq!(report.disposition, Disposition::Undecodable);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.transport.depth("tasks").await.unwrap(), 0);
        assert!(h.transport.dequeue("tasks", Duration::from_secs(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handler_failure_records_failed() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("SendEmail", |_task: Task| async { Err(TaskError::new("smtp unreachable")) })
            .unwrap();
        let h = harness(MemoryTransport::new(), registry);
        let task = Task::new("SendEmail", "user@example.com");
        let message = deliver(&h.transport, encode_task(&task).unwrap()).await;
        let message_id = message.message_id.clone();

        let err = h.processor.process(message).await.unwrap_err();

        assert_eq!(err.attempt(), 1);
        assert!(matches!(err, ProcessingError::Dispatch { source: DispatchError::Handler { .. }, .. }));
        assert!(h.transport.contains("tasks", &message_id));

        let outcome = h.store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.error.unwrap().contains("smtp unreachable"));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_mask_success() {
        let h = harness(MemoryTransport::new(), echo_registry());
        h.store.set_unavailable(true);
        let task = Task::new("SendEmail", "user@example.com");
        let message = deliver(&h.transport, encode_task(&task).unwrap()).await;

        let report = h.processor.process(message).await.unwrap();
        assert_eq!(report.disposition, Disposition::Succeeded);
    }

    #[tokio::test]
    async fn test_lost_lease_reports_acknowledge_error() {
        let transport = MemoryTransport::new();
        let task = Task::new("SendEmail", "user@example.com");
        let message_id = transport.enqueue("tasks", encode_task(&task).unwrap()).await.unwrap();

        // The handler outlives the lease and the message goes to another consumer
        let mut registry = HandlerRegistry::new();
        let competing = transport.clone();
        let stolen = message_id.clone();
        registry
            .register_fn("SendEmail", move |_task: Task| {
                let competing = competing.clone();
                let stolen = stolen.clone();
                async move {
                    competing.expire_lease(&stolen);
                    match competing.dequeue("tasks", Duration::from_secs(120)).await {
                        Ok(_) => Ok("sent".to_string()),
                        Err(e) => Err(TaskError::new(e.to_string())),
                    }
                }
            })
            .unwrap();

        let h = harness(transport, registry);
        let message = h.transport.dequeue("tasks", Duration::from_secs(120)).await.unwrap().unwrap();

        let err = h.processor.process(message).await.unwrap_err();

        assert!(matches!(err, ProcessingError::Acknowledge { .. }));
        assert!(h.transport.contains("tasks", &message_id));
        let outcome = h.store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_running_task_is_renewed() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("GenerateReport", |_task: Task| async {
                tokio::time::sleep(Duration::from_secs(150)).await;
                Ok("report ready".to_string())
            })
            .unwrap();
        let h = harness(MemoryTransport::new(), registry);
        let task = Task::new("GenerateReport", "q3");
        let message = deliver(&h.transport, encode_task(&task).unwrap()).await;
        let message_id = message.message_id.clone();

        let report = h.processor.process(message).await.unwrap();

        assert_eq!(report.renewal.map(|s| s.renewals), Some(2));
        assert!(!h.transport.contains("tasks", &message_id));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_terminal_attempt_is_logged() {
        let h = harness(MemoryTransport::new(), echo_registry());
        let task = Task::new("SendEmail", "user@example.com");
        let mut message = deliver(&h.transport, encode_task(&task).unwrap()).await;
        message.dequeue_count = 5;

        let report = h.processor.process(message).await.unwrap();

        assert_eq!(report.delivery_class, Some(DeliveryClass::Terminal));
        assert!(logs_contain("Final delivery attempt before poison routing"));
    }
}
