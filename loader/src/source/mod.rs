//! Object sources
//!
//! An object source fetches the bytes of one file announced by the queue.
//! Implementations report every failure (missing object, access denied,
//! transport) as `LoaderError::ObjectRetrieval`.

pub mod memory;
pub mod s3;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use memory::MemoryObjectSource;
pub use s3::S3ObjectSource;

/// ObjectSource trait - retrieves whole objects by bucket and key
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Source name for identification and logging
    fn name(&self) -> &'static str;

    /// Fetch the full contents of `bucket/key`
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes>;
}
