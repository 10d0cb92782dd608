//! Publishes one notification announcing a test file
//!
//! Handy for exercising a local loader against ElasticMQ and MinIO.
//!
//! ```bash
//! AWS_SQS_QUEUE_URL=http://localhost:9324/queue/loader \
//! TEST_BUCKET=corpsmap-data-incoming TEST_KEY=test/test-file.csv \
//! cargo run --bin send-test-message
//! ```

use aws_config::BehaviorVersion;
use measurement_loader::config::SqsConfig;
use measurement_loader::envelope::{self, FileEventRecord};
use measurement_loader::queue::{MessageQueue, SqsQueue};
use std::env;
use tracing::info;

const DEFAULT_BUCKET: &str = "corpsmap-data-incoming";
const DEFAULT_KEY: &str = "test/test-file.csv";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let sqs = SqsConfig::from_env()?;
    let bucket = env::var("TEST_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());
    let key = env::var("TEST_KEY").unwrap_or_else(|_| DEFAULT_KEY.to_string());

    let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let queue = SqsQueue::from_config(&shared, &sqs).await?;

    let record = FileEventRecord::new(bucket, key);
    let body = envelope::encode(std::slice::from_ref(&record))?;
    let message_id = queue.send(&body).await?;

    info!(%message_id, file = %record, queue_url = queue.queue_url(), "Sent test message");
    Ok(())
}
