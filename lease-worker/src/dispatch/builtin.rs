//! Reference handlers for the stock task types.
//!
//! They stand in for real integrations (mail gateway, report engine, ...)
//! and only simulate work, which is enough to run the consumer end to end.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{HandlerRegistry, TaskHandler};
use crate::{
    DispatchError, TaskError,
    types::{PayloadSource, Task},
};

pub const SEND_EMAIL: &str = "SendEmail";
pub const SEND_NOTIFICATION: &str = "SendNotification";
pub const GENERATE_REPORT: &str = "GenerateReport";
pub const PROCESS_FILE: &str = "ProcessFile";
pub const DATA_MIGRATION: &str = "DataMigration";

/// Task types that may outlive a single visibility window
pub const LONG_RUNNING_TYPES: [&str; 3] = [GENERATE_REPORT, PROCESS_FILE, DATA_MIGRATION];

/// Delivers an email to the address carried in the payload
pub struct SendEmailHandler;

#[async_trait]
impl TaskHandler for SendEmailHandler {
    async fn execute(&self, task: &Task) -> Result<String, TaskError> {
        let recipient = inline_payload(task)?;
        if !recipient.contains('@') {
            return Err(TaskError::new(format!("'{}' is not an email address", recipient)));
        }
        info!(task_id = %task.id, recipient, "Email sent");
        Ok(format!("Email sent to {}", recipient))
    }
}

/// Pushes a notification with the payload as its text
pub struct SendNotificationHandler;

#[async_trait]
impl TaskHandler for SendNotificationHandler {
    async fn execute(&self, task: &Task) -> Result<String, TaskError> {
        let text = inline_payload(task)?;
        info!(task_id = %task.id, "Notification sent");
        Ok(format!("Notification sent: {}", text))
    }
}

/// Simulated long-running job; `work` is how long it keeps the worker busy
pub struct SimulatedJobHandler {
    label: &'static str,
    work: Duration,
}

impl SimulatedJobHandler {
    pub fn new(label: &'static str, work: Duration) -> Self {
        Self { label, work }
    }
}

#[async_trait]
impl TaskHandler for SimulatedJobHandler {
    async fn execute(&self, task: &Task) -> Result<String, TaskError> {
        let input = match task.payload_source() {
            PayloadSource::Inline(payload) => payload.to_string(),
            PayloadSource::Blob(reference) => format!("blob {}", reference),
        };

        tokio::time::sleep(self.work).await;
        Ok(format!("{} finished for {} after {:?}", self.label, input, self.work))
    }
}

/// Registry with every stock handler; `work` sets the simulated duration of
/// the long-running ones
pub fn default_registry(work: Duration) -> Result<HandlerRegistry, DispatchError> {
    let mut registry = HandlerRegistry::new();
    registry.register(SEND_EMAIL, SendEmailHandler)?;
    registry.register(SEND_NOTIFICATION, SendNotificationHandler)?;
    registry.register(GENERATE_REPORT, SimulatedJobHandler::new("Report", work))?;
    registry.register(PROCESS_FILE, SimulatedJobHandler::new("File processing", work))?;
    registry.register(DATA_MIGRATION, SimulatedJobHandler::new("Data migration", work))?;
    Ok(registry)
}

fn inline_payload(task: &Task) -> Result<&str, TaskError> {
    match task.payload_source() {
        PayloadSource::Inline(payload) if !payload.trim().is_empty() => Ok(payload.trim()),
        PayloadSource::Inline(_) => Err(TaskError::new("payload is empty")),
        PayloadSource::Blob(_) => Err(TaskError::new("blob payloads are not supported by this handler")),
    }
}
