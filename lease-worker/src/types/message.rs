use chrono::{DateTime, Utc};

use super::{MessageId, Receipt};
use crate::lease::Lease;

/// One delivery of a message, as handed out by a transport's dequeue
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Queue the message was dequeued from
    pub queue: String,

    pub message_id: MessageId,

    /// Raw body (Base64 JSON on the wire, plain JSON tolerated)
    pub body: String,

    /// Receipt for this delivery
    pub receipt: Receipt,

    /// Number of times the transport has delivered this message, starting at 1
    pub dequeue_count: u32,

    /// When the message was first enqueued
    pub inserted_at: DateTime<Utc>,
}

impl QueueMessage {
    /// Lease over this delivery, holding the dequeue receipt
    pub fn lease(&self) -> Lease {
        Lease::new(self.queue.clone(), self.message_id.clone(), self.receipt.clone())
    }

    pub fn body_size(&self) -> usize {
        self.body.len()
    }
}
