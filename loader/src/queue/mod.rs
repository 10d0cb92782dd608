//! Message queues
//!
//! The loader only needs three primitives from a queue: a long-polling
//! receive that leases messages for a visibility timeout, a delete by
//! receipt handle, and a send (for publishing test messages). A leased
//! message that is never deleted becomes visible again once its lease
//! expires; that redelivery is the loader's only retry mechanism.

pub mod memory;
pub mod sqs;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

/// A leased queue message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Queue-assigned message ID (stable across redeliveries)
    pub id: String,
    /// Handle for this particular lease, required to delete the message
    pub receipt_handle: String,
    /// Raw message body
    pub body: String,
}

/// Parameters for a receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Upper bound on messages returned by one call
    pub max_messages: u32,
    /// Long-poll wait when no message is immediately available
    pub wait_time: Duration,
    /// Lease granted to each returned message
    pub visibility_timeout: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

/// MessageQueue trait - lease-based receive/delete primitives
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue name for identification and logging
    fn name(&self) -> &'static str;

    /// Receive up to `max_messages`, waiting up to `wait_time` for one to arrive
    ///
    /// An empty vector means the wait elapsed with nothing available.
    async fn receive(&self, options: &ReceiveOptions) -> Result<Vec<QueueMessage>>;

    /// Delete a received message using its receipt handle
    async fn delete(&self, message: &QueueMessage) -> Result<()>;

    /// Publish a message body, returning the assigned message ID
    async fn send(&self, body: &str) -> Result<String>;
}
