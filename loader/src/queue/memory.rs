//! In-memory queue with visibility leases
//!
//! Mirrors the lease semantics of the real queue closely enough to exercise
//! at-least-once delivery in tests: received messages are hidden until their
//! lease expires, each receive issues a fresh receipt handle, and only the
//! latest handle can delete the message.

use crate::error::{LoaderError, Result};
use crate::queue::{MessageQueue, QueueMessage, ReceiveOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// How often an empty long-poll re-checks for visible messages
const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Entry {
    id: String,
    body: String,
    receipt_handle: Option<String>,
    invisible_until: Option<Instant>,
    receive_count: u32,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.is_none_or(|until| until <= now)
    }
}

/// Queue kept entirely in process memory
#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body, returning its message ID
    pub fn push(&self, body: impl Into<String>) -> String {
        let id = ulid::Ulid::new().to_string();
        self.entries.lock().push(Entry {
            id: id.clone(),
            body: body.into(),
            receipt_handle: None,
            invisible_until: None,
            receive_count: 0,
        });
        id
    }

    /// Messages still in the queue, visible or leased
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether a message with this ID is still in the queue
    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().iter().any(|e| e.id == id)
    }

    /// How many times a message has been handed out
    pub fn receive_count(&self, id: &str) -> Option<u32> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.receive_count)
    }

    fn try_receive(&self, options: &ReceiveOptions) -> Vec<QueueMessage> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        entries
            .iter_mut()
            .filter(|e| e.is_visible(now))
            .take(options.max_messages as usize)
            .map(|entry| {
                let handle = ulid::Ulid::new().to_string();
                entry.receipt_handle = Some(handle.clone());
                entry.invisible_until = Some(now + options.visibility_timeout);
                entry.receive_count += 1;
                QueueMessage {
                    id: entry.id.clone(),
                    receipt_handle: handle,
                    body: entry.body.clone(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn receive(&self, options: &ReceiveOptions) -> Result<Vec<QueueMessage>> {
        let deadline = Instant::now() + options.wait_time;

        loop {
            let messages = self.try_receive(options);
            if !messages.is_empty() {
                return Ok(messages);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        let mut entries = self.entries.lock();
        let position = entries
            .iter()
            .position(|e| e.receipt_handle.as_deref() == Some(message.receipt_handle.as_str()))
            .ok_or_else(|| {
                LoaderError::Queue(format!(
                    "receipt handle for message {} is not current",
                    message.id
                ))
            })?;
        entries.remove(position);
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String> {
        Ok(self.push(body))
    }
}
