use std::time::Duration;

use thiserror::Error;

use crate::types::{MessageId, TaskId};

/// Result type for transport operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Result type for outcome store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure errors raised by a queue transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    /// The receipt was already replaced by a renewal or a newer delivery
    #[error("Receipt does not match the current lease for message {0}")]
    ReceiptMismatch(MessageId),

    #[error("Message body too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error returned by a task handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a message body could not be turned into a task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Message body is empty")]
    Empty,

    #[error("Message body decodes to null")]
    Null,

    #[error("Malformed task body: {0}")]
    Malformed(String),
}

/// Routing or handler failure reported by the dispatcher
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("No handler registered for task type '{0}'")]
    UnsupportedTaskType(String),

    #[error("Handler for '{task_type}' failed after {duration:?}: {source}")]
    Handler {
        task_type: String,
        duration: Duration,
        #[source]
        source: TaskError,
    },

    #[error("Handler already registered for task type '{0}'")]
    DuplicateHandler(String),
}

impl DispatchError {
    /// Handler runtime, when a handler actually ran
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Handler { duration, .. } => Some(*duration),
            _ => None,
        }
    }
}

/// Outcome store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Outcome store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Processing failure signalled to the consumer; the message stays on the queue
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    #[error("Task {task_id} failed on attempt {attempt}: {source}")]
    Dispatch {
        task_id: TaskId,
        attempt: u32,
        #[source]
        source: DispatchError,
    },

    /// The handler succeeded but the message could not be deleted
    #[error("Task {task_id} completed on attempt {attempt} but was not acknowledged: {source}")]
    Acknowledge {
        task_id: TaskId,
        attempt: u32,
        #[source]
        source: QueueError,
    },
}

impl ProcessingError {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Dispatch { task_id, .. } | Self::Acknowledge { task_id, .. } => task_id,
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            Self::Dispatch { attempt, .. } | Self::Acknowledge { attempt, .. } => *attempt,
        }
    }
}

/// Invalid worker configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Renewal interval {interval:?} must be shorter than the extension {extension:?}")]
    InvalidRenewalSchedule {
        extension: Duration,
        interval: Duration,
    },

    #[error("Warn threshold {warn_threshold} must be below max attempts {max_attempts}")]
    InvalidRetryPolicy {
        warn_threshold: u32,
        max_attempts: u32,
    },

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Rejected task submission
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Task type must not be empty")]
    EmptyTaskType,

    #[error("Task needs either an inline payload or a blob reference, not both")]
    ConflictingPayload,

    #[error("Encoded payload too large: {size} bytes (max: {max}); use a blob reference")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Transport(#[from] QueueError),
}

impl From<serde_json::Error> for SubmitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result lookup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No outcome recorded for task {0}")]
    NotFound(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
