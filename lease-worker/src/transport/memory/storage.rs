use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    QueueError, QueueResult,
    codec::MAX_INLINE_BODY_BYTES,
    lease::Lease,
    transport::{QueueTransport, poison_queue_name},
    types::{MessageId, QueueMessage, Receipt},
};

/// Tuning for the in-memory transport
#[derive(Debug, Clone)]
pub struct MemoryTransportConfig {
    /// Deliveries allowed before a message is moved to the poison queue
    pub max_dequeue_count: u32,

    /// Largest accepted message body
    pub max_body_bytes: usize,
}

impl Default for MemoryTransportConfig {
    fn default() -> Self {
        Self {
            max_dequeue_count: 5,
            max_body_bytes: MAX_INLINE_BODY_BYTES,
        }
    }
}

/// A message stored in a queue with its delivery state
#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    inserted_at: DateTime<Utc>,
    dequeue_count: u32,
    visible_at: Instant,
    /// Receipt of the latest delivery or renewal
    receipt: Option<Receipt>,
}

/// In-memory lease-based queue for tests and development.
///
/// Visibility deadlines use tokio's clock, so tests running on paused time can
/// expire leases by advancing it.
pub struct MemoryTransport {
    queues: Arc<RwLock<HashMap<String, VecDeque<StoredMessage>>>>,
    config: MemoryTransportConfig,
    renew_calls: Arc<AtomicU64>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_config(MemoryTransportConfig::default())
    }

    pub fn with_config(config: MemoryTransportConfig) -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            config,
            renew_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &MemoryTransportConfig {
        &self.config
    }

    fn find_leased<'a>(
        messages: Option<&'a mut VecDeque<StoredMessage>>,
        lease: &Lease,
    ) -> QueueResult<(usize, &'a mut StoredMessage)> {
        let (index, stored) = messages
            .and_then(|messages| {
                messages
                    .iter_mut()
                    .enumerate()
                    .find(|(_, m)| &m.message_id == lease.message_id())
            })
            .ok_or_else(|| QueueError::MessageNotFound(lease.message_id().clone()))?;

        if stored.receipt.as_ref() != Some(lease.receipt()) {
            return Err(QueueError::ReceiptMismatch(lease.message_id().clone()));
        }
        Ok((index, stored))
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn enqueue(&self, queue: &str, body: String) -> QueueResult<MessageId> {
        if body.len() > self.config.max_body_bytes {
            return Err(QueueError::PayloadTooLarge {
                size: body.len(),
                max: self.config.max_body_bytes,
            });
        }

        let message_id = MessageId::new();
        let stored = StoredMessage {
            message_id: message_id.clone(),
            body,
            inserted_at: Utc::now(),
            dequeue_count: 0,
            visible_at: Instant::now(),
            receipt: None,
        };

        self.queues.write().entry(queue.to_string()).or_default().push_back(stored);
        debug!(queue, message_id = %message_id, "Message enqueued");
        Ok(message_id)
    }

    async fn dequeue(&self, queue: &str, visibility: Duration) -> QueueResult<Option<QueueMessage>> {
        let now = Instant::now();
        let routes_poison = !queue.ends_with("-poison");
        let mut queues = self.queues.write();

        let mut poisoned = Vec::new();
        let mut delivered = None;

        if let Some(messages) = queues.get_mut(queue) {
            let mut index = 0;
            while index < messages.len() {
                if messages[index].visible_at > now {
                    index += 1;
                    continue;
                }

                if routes_poison && messages[index].dequeue_count >= self.config.max_dequeue_count {
                    if let Some(mut message) = messages.remove(index) {
                        message.dequeue_count = 0;
                        message.receipt = None;
                        message.visible_at = now;
                        poisoned.push(message);
                    }
                    continue;
                }

                let message = &mut messages[index];
                let receipt = Receipt::new();
                message.dequeue_count += 1;
                message.visible_at = now + visibility;
                message.receipt = Some(receipt.clone());

                delivered = Some(QueueMessage {
                    queue: queue.to_string(),
                    message_id: message.message_id.clone(),
                    body: message.body.clone(),
                    receipt,
                    dequeue_count: message.dequeue_count,
                    inserted_at: message.inserted_at,
                });
                break;
            }
        }

        if !poisoned.is_empty() {
            let poison_queue = poison_queue_name(queue);
            let target = queues.entry(poison_queue.clone()).or_default();
            for message in poisoned {
                warn!(
                    queue,
                    poison_queue = %poison_queue,
                    message_id = %message.message_id,
                    "Max dequeue count reached, moving message to poison queue"
                );
                target.push_back(message);
            }
        }

        Ok(delivered)
    }

    async fn renew(&self, lease: &Lease, extension: Duration) -> QueueResult<Receipt> {
        self.renew_calls.fetch_add(1, Ordering::Relaxed);
        let mut queues = self.queues.write();
        let (_, stored) = Self::find_leased(queues.get_mut(lease.queue()), lease)?;

        let receipt = Receipt::new();
        stored.receipt = Some(receipt.clone());
        stored.visible_at = Instant::now() + extension;
        Ok(receipt)
    }

    async fn delete(&self, lease: &Lease) -> QueueResult<()> {
        let mut queues = self.queues.write();
        let messages = queues.get_mut(lease.queue());
        let (index, _) = Self::find_leased(messages, lease)?;

        if let Some(messages) = queues.get_mut(lease.queue()) {
            messages.remove(index);
        }
        debug!(queue = lease.queue(), message_id = %lease.message_id(), "Message deleted");
        Ok(())
    }

    async fn depth(&self, queue: &str) -> QueueResult<usize> {
        Ok(self.queues.read().get(queue).map_or(0, VecDeque::len))
    }
}

/// Test helpers for deterministic testing
impl MemoryTransport {
    /// Number of renew calls received, successful or not
    pub fn renew_calls(&self) -> u64 {
        self.renew_calls.load(Ordering::Relaxed)
    }

    /// Receipt the transport currently accepts for a message
    pub fn current_receipt(&self, message_id: &MessageId) -> Option<Receipt> {
        self.find(message_id).and_then(|m| m.receipt)
    }

    /// Deliveries so far for a message still on a queue
    pub fn dequeue_count(&self, message_id: &MessageId) -> Option<u32> {
        self.find(message_id).map(|m| m.dequeue_count)
    }

    /// Check whether a queue still holds a message
    pub fn contains(&self, queue: &str, message_id: &MessageId) -> bool {
        self.queues
            .read()
            .get(queue)
            .is_some_and(|messages| messages.iter().any(|m| &m.message_id == message_id))
    }

    /// Make a leased message visible immediately, as if its lease ran out
    pub fn expire_lease(&self, message_id: &MessageId) {
        let now = Instant::now();
        for messages in self.queues.write().values_mut() {
            if let Some(message) = messages.iter_mut().find(|m| &m.message_id == message_id) {
                message.visible_at = now;
            }
        }
    }

    fn find(&self, message_id: &MessageId) -> Option<StoredMessage> {
        self.queues
            .read()
            .values()
            .flat_map(|messages| messages.iter())
            .find(|m| &m.message_id == message_id)
            .cloned()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryTransport {
    fn clone(&self) -> Self {
        Self {
            queues: self.queues.clone(),
            config: self.config.clone(),
            renew_calls: self.renew_calls.clone(),
        }
    }
}
