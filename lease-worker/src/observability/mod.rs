pub mod metrics;
pub mod telemetry;

#[cfg(feature = "tracing-basic")]
pub mod logging;

pub use metrics::{DurationHistogram, MetricsSnapshot, TaskMetrics, TaskTypeMetrics};
pub use telemetry::LiveTelemetry;

#[cfg(feature = "tracing-basic")]
pub use logging::{init_tracing, LogFormat};

use std::time::Duration;

use crate::types::{Alert, TaskEvent};

/// Fire-and-forget telemetry sink.
///
/// Calls must not block or fail; a broken sink never affects processing.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TaskEvent);

    /// Handler duration for a task type
    fn record_duration(&self, task_type: &str, duration: Duration);

    fn record_queue_depth(&self, queue: &str, depth: usize);

    fn raise_alert(&self, alert: Alert);
}
