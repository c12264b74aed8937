use std::sync::Arc;
use std::time::Duration;

use futures_core::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, error, warn};

use super::{TaskMetrics, TelemetrySink};
use crate::types::{Alert, AlertSeverity, TaskEvent};

const EVENT_CAPACITY: usize = 10_000;

/// In-process telemetry: live counters, a broadcast event stream and the
/// list of alerts raised so far
#[derive(Clone)]
pub struct LiveTelemetry {
    events: broadcast::Sender<TaskEvent>,
    metrics: Arc<TaskMetrics>,
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl LiveTelemetry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            events,
            metrics: Arc::new(TaskMetrics::new()),
            alerts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Events recorded after this call; lagging subscribers skip what they missed
    pub fn event_stream(&self) -> BoxStream<'static, TaskEvent> {
        Box::pin(BroadcastStream::new(self.events.subscribe()).filter_map(|event| event.ok()))
    }

    pub fn metrics(&self) -> &TaskMetrics {
        &self.metrics
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

impl Default for LiveTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for LiveTelemetry {
    fn record(&self, event: TaskEvent) {
        match &event {
            TaskEvent::Submitted { task_type, .. } => self.metrics.increment_submitted(task_type),
            TaskEvent::Completed { task_type, .. } => self.metrics.increment_completed(task_type),
            TaskEvent::Failed { task_type, .. } => self.metrics.increment_failed(task_type),
            TaskEvent::Poisoned { .. } => self.metrics.increment_poisoned(),
            TaskEvent::DecodeRejected { .. } => self.metrics.increment_decode_rejected(),
        }

        debug!(event = event.event_name(), "Recorded task event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn record_duration(&self, task_type: &str, duration: Duration) {
        self.metrics.record_duration(task_type, duration);
    }

    fn record_queue_depth(&self, queue: &str, depth: usize) {
        self.metrics.set_queue_depth(queue, depth);
    }

    fn raise_alert(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical => error!(title = %alert.title, detail = %alert.detail, "Alert raised"),
            AlertSeverity::Warning => warn!(title = %alert.title, detail = %alert.detail, "Alert raised"),
        }
        self.alerts.lock().push(alert);
    }
}
