use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, Task, TaskId};

/// Terminal status of a task delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Completed,
    Failed,
    Poisoned,
}

impl OutcomeStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Poisoned => "poisoned",
        }
    }
}

/// Persisted result of processing a task, upserted by (submission date, task id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOutcome {
    pub task_id: TaskId,
    pub task_type: String,
    pub submitted_at: DateTime<Utc>,
    pub status: OutcomeStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub attempt: u32,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl ProcessingOutcome {
    pub fn completed(task: &Task, result: String, attempt: u32, duration: Duration) -> Self {
        Self::build(task, OutcomeStatus::Completed, Some(result), None, attempt, duration)
    }

    pub fn failed(task: &Task, error: String, attempt: u32, duration: Duration) -> Self {
        Self::build(task, OutcomeStatus::Failed, None, Some(error), attempt, duration)
    }

    pub fn poisoned(task: &Task, error: String, attempt: u32) -> Self {
        Self::build(task, OutcomeStatus::Poisoned, None, Some(error), attempt, Duration::ZERO)
    }

    fn build(
        task: &Task,
        status: OutcomeStatus,
        result: Option<String>,
        error: Option<String>,
        attempt: u32,
        duration: Duration,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            submitted_at: task.submitted_at,
            status,
            result,
            error,
            attempt,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            completed_at: Utc::now(),
        }
    }

    /// Partition the outcome is stored under
    pub fn partition(&self) -> NaiveDate {
        self.submitted_at.date_naive()
    }
}

/// Raw poison message kept for manual review when it could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndecodableMessage {
    pub message_id: MessageId,
    pub body: String,
    pub dequeue_count: u32,
    pub reason: String,
    pub archived_at: DateTime<Utc>,
}
