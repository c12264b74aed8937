#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use std::time::Duration;

use crate::{
    QueueResult,
    lease::Lease,
    types::{MessageId, QueueMessage, Receipt},
};

/// Lease-based queue primitives the consumer is built on.
///
/// Implementations are expected to make each call atomic. Poison routing is
/// internal to the transport: once a message has been delivered the maximum
/// number of times it is moved to the poison queue instead of being handed out.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Append a message body to a queue
    async fn enqueue(&self, queue: &str, body: String) -> QueueResult<MessageId>;

    /// Hand out the next visible message, hiding it for `visibility`
    async fn dequeue(&self, queue: &str, visibility: Duration) -> QueueResult<Option<QueueMessage>>;

    /// Extend the lease by `extension` from now; the old receipt stops working
    async fn renew(&self, lease: &Lease, extension: Duration) -> QueueResult<Receipt>;

    /// Remove the message for good
    async fn delete(&self, lease: &Lease) -> QueueResult<()>;

    /// Approximate number of messages in a queue, visible or not
    async fn depth(&self, queue: &str) -> QueueResult<usize>;
}

/// Name of the queue that receives poison messages for `queue`
pub fn poison_queue_name(queue: &str) -> String {
    format!("{}-poison", queue)
}
