use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, TaskId};

/// Telemetry event protocol for the task lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEvent {
    /// Task was accepted by the gateway and enqueued
    Submitted {
        task_id: TaskId,
        task_type: String,
        at: DateTime<Utc>,
    },

    /// Handler succeeded and the message was processed
    Completed {
        task_id: TaskId,
        task_type: String,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Delivery failed; the transport will redeliver or poison it
    Failed {
        task_id: TaskId,
        task_type: String,
        attempt: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// Message reached the poison path; task id unknown when undecodable
    Poisoned {
        message_id: MessageId,
        task_id: Option<TaskId>,
        at: DateTime<Utc>,
    },

    /// Message body could not be decoded into a task
    DecodeRejected {
        message_id: MessageId,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Poisoned { .. } => "poisoned",
            Self::DecodeRejected { .. } => "decode_rejected",
        }
    }

    /// Task type for events that carry one
    pub fn task_type(&self) -> Option<&str> {
        match self {
            Self::Submitted { task_type, .. }
            | Self::Completed { task_type, .. }
            | Self::Failed { task_type, .. } => Some(task_type),
            Self::Poisoned { .. } | Self::DecodeRejected { .. } => None,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Submitted { at, .. } => at,
            Self::Completed { at, .. } => at,
            Self::Failed { at, .. } => at,
            Self::Poisoned { at, .. } => at,
            Self::DecodeRejected { at, .. } => at,
        }
    }
}

/// Alert severity raised towards operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Operator alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            detail: detail.into(),
            raised_at: Utc::now(),
        }
    }
}
