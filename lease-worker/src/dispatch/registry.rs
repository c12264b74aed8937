use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{FnHandler, TaskHandler};
use crate::{
    DispatchError, TaskError,
    types::{Task, normalize_task_type},
};

/// Successful handler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub output: String,

    /// Time spent inside the handler only
    pub duration: Duration,
}

/// Routing table from task type to handler
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler; task types are matched case-insensitively
    pub fn register<H: TaskHandler + 'static>(&mut self, task_type: &str, handler: H) -> Result<(), DispatchError> {
        self.register_arc(task_type, Arc::new(handler))
    }

    /// Register an async closure as a handler
    pub fn register_fn<F, Fut>(&mut self, task_type: &str, func: F) -> Result<(), DispatchError>
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, TaskError>> + Send + 'static,
    {
        self.register(task_type, FnHandler::new(func))
    }

    pub fn register_arc(&mut self, task_type: &str, handler: Arc<dyn TaskHandler>) -> Result<(), DispatchError> {
        let key = normalize_task_type(task_type);

        if self.handlers.contains_key(&key) {
            return Err(DispatchError::DuplicateHandler(task_type.to_string()));
        }

        self.handlers.insert(key, handler);
        Ok(())
    }

    /// Route a task to its handler and time the handler call
    pub async fn dispatch(&self, task: &Task) -> Result<Dispatched, DispatchError> {
        let handler = self
            .handlers
            .get(&task.normalized_type())
            .ok_or_else(|| DispatchError::UnsupportedTaskType(task.task_type.clone()))?;

        let started = Instant::now();
        let result = handler.execute(task).await;
        let duration = started.elapsed();

        debug!(task_id = %task.id, task_type = %task.task_type, ?duration, ok = result.is_ok(), "Handler returned");

        match result {
            Ok(output) => Ok(Dispatched { output, duration }),
            Err(source) => Err(DispatchError::Handler {
                task_type: task.task_type.clone(),
                duration,
                source,
            }),
        }
    }

    /// Check if a task type is registered
    pub fn is_registered(&self, task_type: &str) -> bool {
        self.handlers.contains_key(&normalize_task_type(task_type))
    }

    /// Normalized names of all registered task types, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
