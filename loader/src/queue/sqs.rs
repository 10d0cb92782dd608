//! SQS queue
//!
//! Works against AWS SQS and SQS-compatible emulators such as ElasticMQ.

use crate::config::SqsConfig;
use crate::error::{LoaderError, Result};
use crate::queue::{MessageQueue, QueueMessage, ReceiveOptions};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::DisplayErrorContext;
use tracing::{debug, info, warn};

/// SQS-backed message queue bound to one queue URL
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Wrap an existing client and a known queue URL
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Build a client from the shared SDK config plus the `AWS_SQS_*` overrides
    ///
    /// The queue URL is taken from the config when present, otherwise it is
    /// looked up by queue name.
    pub async fn from_config(shared: &SdkConfig, config: &SqsConfig) -> Result<Self> {
        let mut builder = aws_sdk_sqs::config::Builder::from(shared);

        if let Some(region) = &config.region {
            builder = builder.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        let queue_url = match (&config.queue_url, &config.queue_name) {
            (Some(url), _) => url.clone(),
            (None, Some(name)) => resolve_queue_url(&client, name).await?,
            (None, None) => {
                return Err(LoaderError::Config(
                    "one of AWS_SQS_QUEUE_URL or AWS_SQS_QUEUE_NAME is required".to_string(),
                ));
            }
        };

        info!(queue_url = %queue_url, "Using queue");
        Ok(Self::new(client, queue_url))
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

/// Look up a queue URL by name
async fn resolve_queue_url(client: &Client, name: &str) -> Result<String> {
    let output = client
        .get_queue_url()
        .queue_name(name)
        .send()
        .await
        .map_err(|e| {
            LoaderError::Config(format!(
                "could not resolve queue '{name}': {}",
                DisplayErrorContext(&e)
            ))
        })?;

    match output.queue_url() {
        Some(url) if !url.is_empty() => Ok(url.to_string()),
        _ => Err(LoaderError::Config(format!(
            "could not find queue url for '{name}'"
        ))),
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn name(&self) -> &'static str {
        "sqs"
    }

    async fn receive(&self, options: &ReceiveOptions) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(options.max_messages as i32)
            .wait_time_seconds(options.wait_time.as_secs() as i32)
            .visibility_timeout(options.visibility_timeout.as_secs() as i32)
            .send()
            .await
            .map_err(|e| {
                LoaderError::Queue(format!("receive failed: {}", DisplayErrorContext(&e)))
            })?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|m| {
                let id = m.message_id().unwrap_or_default().to_string();
                let Some(receipt_handle) = m.receipt_handle() else {
                    warn!(message_id = %id, "Received message without receipt handle, skipping");
                    return None;
                };
                Some(QueueMessage {
                    id,
                    receipt_handle: receipt_handle.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect::<Vec<_>>();

        debug!(count = messages.len(), "Received messages");
        Ok(messages)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(|e| {
                LoaderError::Queue(format!(
                    "delete of message {} failed: {}",
                    message.id,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| {
                LoaderError::Queue(format!("send failed: {}", DisplayErrorContext(&e)))
            })?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }
}
