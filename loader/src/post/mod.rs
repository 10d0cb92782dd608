//! Batch posters
//!
//! A poster submits all collections parsed from one file as a single JSON
//! array. Success means the ingestion API answered `201 Created`; anything
//! else is an error and the queue message stays undeleted.

pub mod http;
pub mod stdout;

use crate::error::Result;
use crate::measurement::MeasurementCollection;
use async_trait::async_trait;
use std::time::Duration;

pub use http::HttpPoster;
pub use stdout::StdoutPoster;

/// What a successful post delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReport {
    /// HTTP status returned by the API
    pub status: u16,
    /// Collections in the payload
    pub collections: usize,
    /// Measurements across all collections
    pub measurements: usize,
    /// Time spent on the request
    pub elapsed: Duration,
}

impl PostReport {
    pub(crate) fn new(
        status: u16,
        collections: &[MeasurementCollection],
        elapsed: Duration,
    ) -> Self {
        Self {
            status,
            collections: collections.len(),
            measurements: collections.iter().map(MeasurementCollection::len).sum(),
            elapsed,
        }
    }
}

/// Poster trait - submits one file's collections to a destination
///
/// # Example
///
/// ```ignore
/// struct MyPoster;
///
/// #[async_trait]
/// impl Poster for MyPoster {
///     fn name(&self) -> &'static str { "my-poster" }
///
///     async fn post(&self, collections: &[MeasurementCollection]) -> Result<PostReport> {
///         let body = encode_payload(collections)?;
///         // deliver body ...
///         Ok(PostReport { status: 201, collections: collections.len(), measurements: 0, elapsed: Duration::ZERO })
///     }
/// }
/// ```
#[async_trait]
pub trait Poster: Send + Sync {
    /// Poster name for identification and logging
    fn name(&self) -> &'static str;

    /// Submit every collection from one file in a single request
    async fn post(&self, collections: &[MeasurementCollection]) -> Result<PostReport>;
}

/// Serialize collections as the JSON array the ingestion API expects
///
/// Identical input always yields identical bytes.
pub fn encode_payload(collections: &[MeasurementCollection]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(collections)?)
}
