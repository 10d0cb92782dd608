//! S3 object source
//!
//! Works against AWS S3 and S3-compatible stores such as MinIO (set an
//! endpoint, disable SSL and force path-style addressing).

use crate::config::S3Config;
use crate::error::{LoaderError, Result};
use crate::source::ObjectSource;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use bytes::Bytes;
use tracing::debug;

/// Object source reading whole objects with `GetObject`
pub struct S3ObjectSource {
    client: Client,
}

impl S3ObjectSource {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the shared SDK config plus the `AWS_S3_*` overrides
    pub fn from_config(shared: &SdkConfig, config: &S3Config) -> Self {
        let mut builder =
            aws_sdk_s3::config::Builder::from(shared).force_path_style(config.force_path_style);

        if let Some(region) = &config.region {
            builder = builder.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = config.endpoint_url() {
            builder = builder.endpoint_url(endpoint);
        }

        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl ObjectSource for S3ObjectSource {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| LoaderError::retrieval(bucket, key, DisplayErrorContext(&e).to_string()))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| LoaderError::retrieval(bucket, key, format!("reading body: {e}")))?
            .into_bytes();

        debug!(bucket, key, bytes = data.len(), "Fetched object");
        Ok(data)
    }
}
