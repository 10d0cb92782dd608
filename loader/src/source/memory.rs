//! In-memory object source for tests and local runs

use crate::error::{LoaderError, Result};
use crate::source::ObjectSource;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Object source backed by a map of `(bucket, key)` to bytes
#[derive(Default)]
pub struct MemoryObjectSource {
    objects: RwLock<HashMap<(String, String), Bytes>>,
    fetch_count: AtomicU64,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) an object
    pub fn put(&self, bucket: impl Into<String>, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects
            .write()
            .insert((bucket.into(), key.into()), data.into());
    }

    /// Remove an object, returning whether it existed
    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .write()
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }

    /// Number of fetch calls served (including failures)
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectSource for MemoryObjectSource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| LoaderError::retrieval(bucket, key, "object not found"))
    }
}
