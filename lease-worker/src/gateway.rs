//! Task submission and outcome lookup.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use crate::{
    LookupError, SubmitError,
    codec::encode_task,
    config::WorkerConfig,
    observability::TelemetrySink,
    store::OutcomeStore,
    transport::QueueTransport,
    types::{Priority, ProcessingOutcome, Task, TaskEvent, TaskId},
};

/// Submission request; the id and timestamp are assigned by the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub task_type: String,
    pub payload: String,
    pub blob_payload_reference: Option<String>,
    pub priority: Priority,
}

impl NewTask {
    pub fn inline(task_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Payload stored elsewhere, referenced by `reference`
    pub fn blob(task_type: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            blob_payload_reference: Some(reference.into()),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Front door of the queue: accepts tasks and answers "what happened to it"
pub struct TaskGateway {
    transport: Arc<dyn QueueTransport>,
    store: Arc<dyn OutcomeStore>,
    telemetry: Arc<dyn TelemetrySink>,
    queue: String,
    max_inline_body_bytes: usize,
}

impl TaskGateway {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        store: Arc<dyn OutcomeStore>,
        telemetry: Arc<dyn TelemetrySink>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            transport,
            store,
            telemetry,
            queue: config.queue.clone(),
            max_inline_body_bytes: config.max_inline_body_bytes,
        }
    }

    /// Enqueue a task and return its id without waiting for processing
    #[instrument(skip_all, fields(task_type = %request.task_type))]
    pub async fn submit(&self, request: NewTask) -> Result<TaskId, SubmitError> {
        let task_type = request.task_type.trim();
        if task_type.is_empty() {
            return Err(SubmitError::EmptyTaskType);
        }

        let mut task = match request.blob_payload_reference {
            Some(_) if !request.payload.is_empty() => return Err(SubmitError::ConflictingPayload),
            Some(reference) => Task::with_blob_reference(task_type, reference),
            None => Task::new(task_type, request.payload),
        };
        task = task.with_priority(request.priority);

        let body = encode_task(&task)?;
        if body.len() > self.max_inline_body_bytes {
            return Err(SubmitError::PayloadTooLarge {
                size: body.len(),
                max: self.max_inline_body_bytes,
            });
        }

        let message_id = self.transport.enqueue(&self.queue, body).await?;

        self.telemetry.record(TaskEvent::Submitted {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            at: Utc::now(),
        });
        info!(task_id = %task.id, message_id = %message_id, "Task submitted");
        Ok(task.id)
    }

    pub async fn submit_inline(&self, task_type: &str, payload: &str) -> Result<TaskId, SubmitError> {
        self.submit(NewTask::inline(task_type, payload)).await
    }

    /// Terminal outcome of a task; `NotFound` until one is recorded
    pub async fn outcome(&self, task_id: &TaskId, submitted_on: NaiveDate) -> Result<ProcessingOutcome, LookupError> {
        self.store
            .get(task_id, submitted_on)
            .await?
            .ok_or_else(|| LookupError::NotFound(task_id.clone()))
    }

    pub async fn outcomes_for(&self, submitted_on: NaiveDate) -> Result<Vec<ProcessingOutcome>, LookupError> {
        Ok(self.store.list(submitted_on).await?)
    }
}
