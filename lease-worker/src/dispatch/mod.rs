pub mod registry;
pub mod builtin;

pub use registry::{HandlerRegistry, Dispatched};

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::{TaskError, types::Task};

/// Executes one kind of task
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task and describe the result
    async fn execute(&self, task: &Task) -> Result<String, TaskError>;
}

/// Adapts an async closure into a [`TaskHandler`]
pub struct FnHandler<F, Fut> {
    func: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, TaskError>> + Send,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _future: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F, Fut>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, TaskError>> + Send,
{
    async fn execute(&self, task: &Task) -> Result<String, TaskError> {
        (self.func)(task.clone()).await
    }
}
