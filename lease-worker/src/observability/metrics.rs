use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Samples kept per task type for the duration histogram
const MAX_SAMPLES: usize = 1000;

/// Lifecycle counters, global and per task type
pub struct TaskMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    poisoned: AtomicU64,
    decode_rejected: AtomicU64,

    task_types: RwLock<HashMap<String, TaskTypeMetrics>>,
    durations: RwLock<DurationHistogram>,
    queue_depths: RwLock<HashMap<String, usize>>,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            poisoned: AtomicU64::new(0),
            decode_rejected: AtomicU64::new(0),
            task_types: RwLock::new(HashMap::new()),
            durations: RwLock::new(DurationHistogram::new()),
            queue_depths: RwLock::new(HashMap::new()),
        }
    }

    pub fn increment_submitted(&self, task_type: &str) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.task_types.write().entry(task_type.to_string()).or_default().submitted += 1;
    }

    pub fn increment_completed(&self, task_type: &str) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.task_types.write().entry(task_type.to_string()).or_default().completed += 1;
    }

    pub fn increment_failed(&self, task_type: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.task_types.write().entry(task_type.to_string()).or_default().failed += 1;
    }

    pub fn increment_poisoned(&self) {
        self.poisoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decode_rejected(&self) {
        self.decode_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration(&self, task_type: &str, duration: Duration) {
        self.durations.write().record(task_type, duration);
    }

    pub fn set_queue_depth(&self, queue: &str, depth: usize) {
        self.queue_depths.write().insert(queue.to_string(), depth);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn poisoned(&self) -> u64 {
        self.poisoned.load(Ordering::Relaxed)
    }

    pub fn decode_rejected(&self) -> u64 {
        self.decode_rejected.load(Ordering::Relaxed)
    }

    pub fn task_type_metrics(&self, task_type: &str) -> Option<TaskTypeMetrics> {
        self.task_types.read().get(task_type).cloned()
    }

    /// Last sampled depth of a queue
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.queue_depths.read().get(queue).copied()
    }

    pub fn durations(&self) -> DurationHistogram {
        self.durations.read().clone()
    }

    /// Copy of all counters at this instant
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            submitted: self.submitted(),
            completed: self.completed(),
            failed: self.failed(),
            poisoned: self.poisoned(),
            decode_rejected: self.decode_rejected(),
            task_types: self.task_types.read().clone(),
            queue_depths: self.queue_depths.read().clone(),
        }
    }
}

impl Default for TaskMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one task type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTypeMetrics {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

impl TaskTypeMetrics {
    /// Share of finished deliveries that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.failed;
        if total == 0 {
            100.0
        } else {
            (self.completed as f64 / total as f64) * 100.0
        }
    }
}

/// Rolling handler durations per task type
#[derive(Debug, Clone, Default)]
pub struct DurationHistogram {
    samples: HashMap<String, VecDeque<Duration>>,
}

impl DurationHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, task_type: &str, duration: Duration) {
        let samples = self.samples.entry(task_type.to_string()).or_default();
        samples.push_back(duration);
        if samples.len() > MAX_SAMPLES {
            samples.pop_front();
        }
    }

    pub fn count(&self, task_type: &str) -> usize {
        self.samples.get(task_type).map_or(0, VecDeque::len)
    }

    pub fn average(&self, task_type: &str) -> Option<Duration> {
        let samples = self.samples.get(task_type).filter(|s| !s.is_empty())?;
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    /// Nearest-rank percentile, `percentile` in 0..=100
    pub fn percentile(&self, task_type: &str, percentile: f64) -> Option<Duration> {
        let samples = self.samples.get(task_type).filter(|s| !s.is_empty())?;

        let mut sorted: Vec<Duration> = samples.iter().copied().collect();
        sorted.sort();

        let rank = ((percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted.get(rank).copied()
    }
}

/// Point-in-time copy of [`TaskMetrics`]
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub poisoned: u64,
    pub decode_rejected: u64,
    pub task_types: HashMap<String, TaskTypeMetrics>,
    pub queue_depths: HashMap<String, usize>,
}

impl MetricsSnapshot {
    /// Submitted tasks without a terminal outcome yet
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.poisoned)
    }
}
