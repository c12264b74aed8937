//! # lease-worker: at-least-once task queue consumer
//!
//! Processes tasks from a lease-based queue where a task may run longer than
//! the message's visibility window:
//!
//! - **Lease renewal**: long-running task types get a background loop that
//!   keeps extending the message's invisibility until the handler returns
//! - **Delivery tracking**: every delivery attempt is classified so logs get
//!   louder as a message approaches its poison threshold
//! - **Poison routing**: messages delivered too often land on `<queue>-poison`
//!   and are recorded or archived for manual review
//! - **Pluggable collaborators**: transport, outcome store and telemetry sit
//!   behind traits, with in-memory implementations behind the `memory` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lease_worker::prelude::*;
//! use lease_worker::{store::memory::MemoryOutcomeStore, transport::memory::MemoryTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(MemoryTransport::new());
//! let store = Arc::new(MemoryOutcomeStore::new());
//! let telemetry = Arc::new(LiveTelemetry::new());
//! let config = WorkerConfig::default();
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("SendEmail", |task: Task| async move {
//!     Ok(format!("Email sent to {}", task.payload))
//! })?;
//!
//! let gateway = TaskGateway::new(transport.clone(), store.clone(), telemetry.clone(), &config);
//! let task_id = gateway.submit(NewTask::inline("SendEmail", "user@example.com")).await?;
//!
//! let consumer = Consumer::new(transport, Arc::new(registry), store, telemetry, config)?;
//! let handle = consumer.start();
//! // ...
//! handle.shutdown().await?;
//! # let _ = task_id;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod lease;
pub mod observability;
pub mod poison;
pub mod processor;
pub mod store;
pub mod tracker;
pub mod transport;
pub mod types;

pub use error::{
    ConfigError, DecodeError, DispatchError, LookupError, ProcessingError, QueueError, QueueResult, StoreError,
    StoreResult, SubmitError, TaskError,
};

pub use config::WorkerConfig;
pub use consumer::{Consumer, ConsumerHandle};
pub use dispatch::{Dispatched, HandlerRegistry, TaskHandler};
pub use gateway::{NewTask, TaskGateway};
pub use lease::{Lease, LeaseRenewer, RenewalHandle, RenewalSchedule, RenewalSummary};
pub use observability::{LiveTelemetry, TelemetrySink};
pub use poison::{PoisonDisposition, PoisonHandler};
pub use processor::{Disposition, ProcessReport, ProcessingStage, TaskProcessor};
pub use store::OutcomeStore;
pub use tracker::{classify, DeliveryClass, RetryPolicy};
pub use transport::QueueTransport;
pub use types::{
    Alert, AlertSeverity, MessageId, OutcomeStatus, Priority, ProcessingOutcome, QueueMessage, Receipt, Task,
    TaskEvent, TaskId,
};

/// Everything needed to wire a consumer
pub mod prelude {
    pub use crate::{
        Consumer, ConsumerHandle, HandlerRegistry, LiveTelemetry, NewTask, OutcomeStore, QueueTransport,
        TaskGateway, TaskHandler, TelemetrySink, WorkerConfig,
    };

    pub use crate::{ProcessingOutcome, Task, TaskError, TaskId};

    pub use async_trait::async_trait;
}
