//! CSV transformer
//!
//! Turns one announced file into per-series measurement collections: fetch
//! the object, parse every row, group by series. No retries happen here; a
//! failed file is retried only when the queue redelivers its message.

mod rows;

pub use rows::{TransformedFile, parse_rows};

use crate::envelope::FileEventRecord;
use crate::error::Result;
use crate::source::ObjectSource;
use std::sync::Arc;
use tracing::debug;

/// Fetches and parses measurement files
#[derive(Clone)]
pub struct CsvTransformer {
    source: Arc<dyn ObjectSource>,
}

impl CsvTransformer {
    pub fn new(source: Arc<dyn ObjectSource>) -> Self {
        Self { source }
    }

    /// Fetch `record` from the object source and parse it
    ///
    /// # Errors
    /// `ObjectRetrieval` if the object cannot be fetched, `RowParse` if any
    /// row is malformed.
    pub async fn transform(&self, record: &FileEventRecord) -> Result<TransformedFile> {
        let data = self.source.fetch(&record.bucket, &record.key).await?;
        let file = parse_rows(&data)?;

        debug!(
            source = self.source.name(),
            bucket = %record.bucket,
            key = %record.key,
            bytes = data.len(),
            rows = file.row_count,
            series = file.series_count(),
            "Parsed file"
        );

        Ok(file)
    }
}
