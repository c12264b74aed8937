//! Terminal sink for messages the transport moved to the poison queue.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, instrument, warn};

use crate::{
    StoreError,
    codec::decode_task,
    observability::TelemetrySink,
    store::OutcomeStore,
    types::{Alert, AlertSeverity, ProcessingOutcome, QueueMessage, TaskEvent, TaskId, UndecodableMessage},
};

/// How a poison message was dealt with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoisonDisposition {
    /// Decoded; a `Poisoned` outcome was recorded for the task
    Recorded(TaskId),

    /// Not a task; the raw body was archived for manual review
    Archived,
}

/// Records poison messages and alerts operators.
///
/// Only store failures are returned; the message must then stay on the
/// poison queue so it is handled again.
pub struct PoisonHandler {
    store: Arc<dyn OutcomeStore>,
    telemetry: Arc<dyn TelemetrySink>,
    max_attempts: u32,
}

impl PoisonHandler {
    /// `max_attempts` is written as the attempt number of poisoned outcomes
    pub fn new(store: Arc<dyn OutcomeStore>, telemetry: Arc<dyn TelemetrySink>, max_attempts: u32) -> Self {
        Self {
            store,
            telemetry,
            max_attempts,
        }
    }

    #[instrument(name = "poison_message", skip_all, fields(message_id = %message.message_id))]
    pub async fn handle(&self, message: &QueueMessage) -> Result<PoisonDisposition, StoreError> {
        match decode_task(&message.body) {
            Ok(task) => {
                let reason = format!("Exceeded {} delivery attempts", self.max_attempts);
                let outcome = ProcessingOutcome::poisoned(&task, reason, self.max_attempts);

                if let Err(e) = self.store.upsert(outcome).await {
                    return Err(self.store_failed(message, e));
                }

                error!(task_id = %task.id, task_type = %task.task_type, "Task poisoned");
                self.telemetry.record(TaskEvent::Poisoned {
                    message_id: message.message_id.clone(),
                    task_id: Some(task.id.clone()),
                    at: Utc::now(),
                });
                self.telemetry.raise_alert(Alert::new(
                    AlertSeverity::Critical,
                    "Task moved to poison queue",
                    format!(
                        "Task {} ({}) failed {} times and needs manual intervention",
                        task.id, task.task_type, self.max_attempts
                    ),
                ));
                Ok(PoisonDisposition::Recorded(task.id))
            }
            Err(decode_error) => {
                let archived = UndecodableMessage {
                    message_id: message.message_id.clone(),
                    body: message.body.clone(),
                    dequeue_count: message.dequeue_count,
                    reason: decode_error.to_string(),
                    archived_at: Utc::now(),
                };

                if let Err(e) = self.store.archive_undecodable(archived).await {
                    return Err(self.store_failed(message, e));
                }

                warn!(reason = %decode_error, "Undecodable poison message archived");
                self.telemetry.record(TaskEvent::Poisoned {
                    message_id: message.message_id.clone(),
                    task_id: None,
                    at: Utc::now(),
                });
                self.telemetry.raise_alert(Alert::new(
                    AlertSeverity::Warning,
                    "Undecodable message in poison queue",
                    format!("Message {} could not be decoded: {}", message.message_id, decode_error),
                ));
                Ok(PoisonDisposition::Archived)
            }
        }
    }

    fn store_failed(&self, message: &QueueMessage, e: StoreError) -> StoreError {
        error!(error = %e, "Failed to record poison message");
        self.telemetry.raise_alert(Alert::new(
            AlertSeverity::Critical,
            "Poison handling failed",
            format!("Message {} could not be recorded: {}", message.message_id, e),
        ));
        e
    }
}
