use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::debug;

use super::OutcomeStore;
use crate::{
    StoreError, StoreResult,
    types::{ProcessingOutcome, TaskId, UndecodableMessage},
};

type Partitions = BTreeMap<NaiveDate, HashMap<TaskId, ProcessingOutcome>>;

/// In-memory outcome store for tests and development
#[derive(Clone, Default)]
pub struct MemoryOutcomeStore {
    partitions: Arc<RwLock<Partitions>>,
    archive: Arc<RwLock<Vec<UndecodableMessage>>>,
    upserts: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OutcomeStore for MemoryOutcomeStore {
    async fn upsert(&self, outcome: ProcessingOutcome) -> StoreResult<()> {
        self.check_available()?;

        debug!(task_id = %outcome.task_id, status = outcome.status.name(), "Upserting outcome");
        self.partitions
            .write()
            .entry(outcome.partition())
            .or_default()
            .insert(outcome.task_id.clone(), outcome);
        self.upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId, date: NaiveDate) -> StoreResult<Option<ProcessingOutcome>> {
        self.check_available()?;
        Ok(self
            .partitions
            .read()
            .get(&date)
            .and_then(|partition| partition.get(task_id))
            .cloned())
    }

    async fn list(&self, date: NaiveDate) -> StoreResult<Vec<ProcessingOutcome>> {
        self.check_available()?;
        let mut outcomes: Vec<ProcessingOutcome> = self
            .partitions
            .read()
            .get(&date)
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default();
        outcomes.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(outcomes)
    }

    async fn archive_undecodable(&self, message: UndecodableMessage) -> StoreResult<()> {
        self.check_available()?;
        debug!(message_id = %message.message_id, "Archiving undecodable message");
        self.archive.write().push(message);
        Ok(())
    }

    async fn archived(&self) -> StoreResult<Vec<UndecodableMessage>> {
        self.check_available()?;
        Ok(self.archive.read().clone())
    }
}

/// Test helpers for deterministic testing
impl MemoryOutcomeStore {
    /// Successful upserts so far, including overwrites
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::Relaxed)
    }

    /// Make every call fail with [`StoreError::Unavailable`] until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutcomeStatus, Task};
    use std::time::Duration;

    #[tokio::test]
    async fn test_upsert_is_last_writer_wins() {
        let store = MemoryOutcomeStore::new();
        let task = Task::new("SendEmail", "user@example.com");

        store
            .upsert(ProcessingOutcome::failed(&task, "smtp down".into(), 1, Duration::from_millis(5)))
            .await
            .unwrap();
        store
            .upsert(ProcessingOutcome::completed(&task, "sent".into(), 2, Duration::from_millis(7)))
            .await
            .unwrap();

        let stored = store.get(&task.id, task.submission_date()).await.unwrap().unwrap();
        assert_eq!(stored.status, OutcomeStatus::Completed);
        assert_eq!(stored.attempt, 2);
        assert_eq!(store.list(task.submission_date()).await.unwrap().len(), 1);
        assert_eq!(store.upsert_count(), 2);
    }

    #[tokio::test]
    async fn test_get_is_scoped_to_partition() {
        let store = MemoryOutcomeStore::new();
        let task = Task::new("SendEmail", "user@example.com");
        store
            .upsert(ProcessingOutcome::completed(&task, "sent".into(), 1, Duration::ZERO))
            .await
            .unwrap();

        let other_day = task.submission_date().pred_opt().unwrap();
        assert!(store.get(&task.id, other_day).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryOutcomeStore::new();
        store.set_unavailable(true);

        let task = Task::new("SendEmail", "user@example.com");
        let result = store
            .upsert(ProcessingOutcome::completed(&task, "sent".into(), 1, Duration::ZERO))
            .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.upsert_count(), 0);
    }
}
