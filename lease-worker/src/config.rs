//! Worker configuration.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    ConfigError,
    codec::MAX_INLINE_BODY_BYTES,
    dispatch::builtin::LONG_RUNNING_TYPES,
    lease::RenewalSchedule,
    tracker::RetryPolicy,
    transport::poison_queue_name,
    types::normalize_task_type,
};

/// Prefix of every environment variable read by [`WorkerConfig::from_env`]
pub const ENV_PREFIX: &str = "LEASE_WORKER_";

/// Configuration handed to the consumer and the processor at construction
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue the consumer polls; poison messages go to `<queue>-poison`
    pub queue: String,

    /// Invisibility window granted by each dequeue
    pub visibility_timeout: Duration,

    /// Lease renewal for long-running task types
    pub renewal: RenewalSchedule,

    /// Attempt thresholds for log severity and poison bookkeeping
    pub retry: RetryPolicy,

    /// Idle wait between polls of an empty queue
    pub poll_interval: Duration,

    /// Messages processed at the same time
    pub max_concurrency: usize,

    /// How often queue depths are reported to telemetry
    pub depth_sample_interval: Duration,

    /// Largest encoded task the gateway puts on the queue inline
    pub max_inline_body_bytes: usize,

    long_running_types: HashSet<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "tasks".to_string(),
            visibility_timeout: Duration::from_secs(120),
            renewal: RenewalSchedule::default(),
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(1),
            max_concurrency: 8,
            depth_sample_interval: Duration::from_secs(30),
            max_inline_body_bytes: MAX_INLINE_BODY_BYTES,
            long_running_types: LONG_RUNNING_TYPES.iter().map(|t| normalize_task_type(t)).collect(),
        }
    }
}

impl WorkerConfig {
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    pub fn with_renewal(mut self, renewal: RenewalSchedule) -> Self {
        self.renewal = renewal;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_depth_sample_interval(mut self, interval: Duration) -> Self {
        self.depth_sample_interval = interval;
        self
    }

    /// Replace the set of task types that get lease renewal
    pub fn with_long_running_types<I, S>(mut self, task_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.long_running_types = task_types
            .into_iter()
            .map(|t| normalize_task_type(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// Whether tasks of this type run under lease renewal
    pub fn is_long_running(&self, task_type: &str) -> bool {
        self.long_running_types.contains(&normalize_task_type(task_type))
    }

    /// Normalized long-running task types, sorted
    pub fn long_running_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.long_running_types.iter().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn poison_queue(&self) -> String {
        poison_queue_name(&self.queue)
    }

    /// Check the settings that cannot be enforced by their types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(invalid("queue", &self.queue));
        }
        // The first renewal must land before the dequeue lease runs out
        if self.renewal.interval() >= self.visibility_timeout {
            return Err(invalid(
                "visibility_timeout",
                format!("{:?} (renewal interval {:?})", self.visibility_timeout, self.renewal.interval()),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "0"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "0"));
        }
        if self.depth_sample_interval.is_zero() {
            return Err(invalid("depth_sample_interval", "0"));
        }
        Ok(())
    }

    /// Build from `LEASE_WORKER_*` environment variables, defaults for the rest
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup using the same variable names as
    /// [`WorkerConfig::from_env`]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };
        let defaults = Self::default();
        let mut config = Self::default();

        if let Some((_, queue)) = var("QUEUE") {
            config.queue = queue.trim().to_string();
        }
        if let Some((key, value)) = var("VISIBILITY_TIMEOUT_SECS") {
            config.visibility_timeout = Duration::from_secs(parse(&key, &value)?);
        }

        let extension = match var("RENEWAL_EXTENSION_SECS") {
            Some((key, value)) => Duration::from_secs(parse(&key, &value)?),
            None => defaults.renewal.extension(),
        };
        let interval = match var("RENEWAL_INTERVAL_SECS") {
            Some((key, value)) => Duration::from_secs(parse(&key, &value)?),
            None => defaults.renewal.interval(),
        };
        config.renewal = RenewalSchedule::new(extension, interval)?;

        let warn_threshold = match var("WARN_ATTEMPTS") {
            Some((key, value)) => parse(&key, &value)?,
            None => defaults.retry.warn_threshold(),
        };
        let max_attempts = match var("MAX_ATTEMPTS") {
            Some((key, value)) => parse(&key, &value)?,
            None => defaults.retry.max_attempts(),
        };
        config.retry = RetryPolicy::new(warn_threshold, max_attempts)?;

        if let Some((_, value)) = var("LONG_RUNNING_TYPES") {
            config = config.with_long_running_types(value.split(','));
        }
        if let Some((key, value)) = var("POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse(&key, &value)?);
        }
        if let Some((key, value)) = var("MAX_CONCURRENCY") {
            config.max_concurrency = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("DEPTH_SAMPLE_SECS") {
            config.depth_sample_interval = Duration::from_secs(parse(&key, &value)?);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}
