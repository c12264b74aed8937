//! Persistence of processing outcomes.

#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    StoreResult,
    types::{ProcessingOutcome, TaskId, UndecodableMessage},
};

/// Outcome table partitioned by submission date and keyed by task id.
///
/// `upsert` must be idempotent: writing the same key twice keeps the last
/// write, since redeliveries record the same task again.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Insert or replace the outcome under (submission date, task id)
    async fn upsert(&self, outcome: ProcessingOutcome) -> StoreResult<()>;

    /// Fetch one outcome
    async fn get(&self, task_id: &TaskId, date: NaiveDate) -> StoreResult<Option<ProcessingOutcome>>;

    /// Every outcome stored for a submission date
    async fn list(&self, date: NaiveDate) -> StoreResult<Vec<ProcessingOutcome>>;

    /// Keep a poison message that never decoded
    async fn archive_undecodable(&self, message: UndecodableMessage) -> StoreResult<()>;

    /// Archived undecodable messages, oldest first
    async fn archived(&self) -> StoreResult<Vec<UndecodableMessage>>;
}
