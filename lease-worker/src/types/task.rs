use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Priority, TaskId};

/// A unit of work as it travels through the queue.
///
/// Two JSON shapes deserialize into this type: the submission shape
/// `{id, taskType, payload, submittedAt}` and the consumer shape
/// `{taskId, taskType, payload, blobPayloadReference?, enqueuedAt, priority}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "taskId")]
    pub id: TaskId,

    /// Tag selecting the handler
    pub task_type: String,

    /// Inline payload; empty when the payload lives in a blob store
    #[serde(default)]
    pub payload: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_payload_reference: Option<String>,

    #[serde(alias = "enqueuedAt")]
    pub submitted_at: DateTime<Utc>,

    #[serde(default)]
    pub priority: Priority,
}

/// Where the meaningful payload of a task lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource<'a> {
    Inline(&'a str),
    Blob(&'a str),
}

impl Task {
    /// Create a task with an inline payload
    pub fn new(task_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            payload: payload.into(),
            blob_payload_reference: None,
            submitted_at: Utc::now(),
            priority: Priority::default(),
        }
    }

    /// Create a task whose payload was offloaded to a blob store
    pub fn with_blob_reference(task_type: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            blob_payload_reference: Some(reference.into()),
            ..Self::new(task_type, String::new())
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The blob reference wins whenever it is set
    pub fn payload_source(&self) -> PayloadSource<'_> {
        match self.blob_payload_reference.as_deref() {
            Some(reference) => PayloadSource::Blob(reference),
            None => PayloadSource::Inline(&self.payload),
        }
    }

    /// Task type as used for handler lookups
    pub fn normalized_type(&self) -> String {
        normalize_task_type(&self.task_type)
    }

    /// UTC day the task was submitted on; outcomes are partitioned by it
    pub fn submission_date(&self) -> chrono::NaiveDate {
        self.submitted_at.date_naive()
    }
}

/// Case- and whitespace-insensitive form of a task type
pub fn normalize_task_type(task_type: &str) -> String {
    task_type.trim().to_lowercase()
}
