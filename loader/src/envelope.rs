//! Notification envelope decoding
//!
//! Queue messages are produced by a pub/sub fan-out layer that wraps the object
//! store's event notification:
//!
//! ```text
//! {"Message": "{\"Records\":[{\"s3\":{\"bucket\":{\"name\":\"b\"},\"object\":{\"key\":\"k\"}}}]}"}
//!     │
//!     ▼  decode()
//! [FileEventRecord { bucket: "b", key: "k" }]
//! ```
//!
//! Both layers are parsed into fresh values on every call.

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One object-storage write announced by the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEventRecord {
    pub bucket: String,
    pub key: String,
}

impl FileEventRecord {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for FileEventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Outer envelope; every field besides `Message` is ignored
#[derive(Serialize, Deserialize)]
struct NotificationEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

/// Object store event notification
///
/// `Records` is absent (or null) on the store's own "test event"
/// notifications, which decode to an empty batch.
#[derive(Serialize, Deserialize)]
struct FileEventBatch {
    #[serde(rename = "Records", default)]
    records: Option<Vec<EventRecordJson>>,
}

#[derive(Serialize, Deserialize)]
struct EventRecordJson {
    s3: S3Entity,
}

#[derive(Serialize, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Serialize, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Serialize, Deserialize)]
struct S3Object {
    key: String,
}

/// Decode a queue message body into the file records it announces
///
/// Records are returned in envelope order.
///
/// # Errors
/// `LoaderError::EnvelopeDecode` if either layer is malformed or a record has
/// an empty bucket name or object key.
pub fn decode(body: &str) -> Result<Vec<FileEventRecord>> {
    let envelope: NotificationEnvelope = serde_json::from_str(body)
        .map_err(|e| LoaderError::EnvelopeDecode(format!("notification envelope: {e}")))?;

    let batch: FileEventBatch = serde_json::from_str(&envelope.message)
        .map_err(|e| LoaderError::EnvelopeDecode(format!("file event batch: {e}")))?;

    batch
        .records
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            let S3Entity { bucket, object } = record.s3;
            if bucket.name.is_empty() {
                return Err(LoaderError::EnvelopeDecode(format!(
                    "record {idx}: empty bucket name"
                )));
            }
            if object.key.is_empty() {
                return Err(LoaderError::EnvelopeDecode(format!(
                    "record {idx}: empty object key"
                )));
            }
            Ok(FileEventRecord {
                bucket: bucket.name,
                key: object.key,
            })
        })
        .collect()
}

/// Build a queue message body announcing the given files
///
/// Inverse of [`decode`]; used to publish test messages.
pub fn encode(records: &[FileEventRecord]) -> Result<String> {
    let batch = FileEventBatch {
        records: Some(
            records
                .iter()
                .map(|r| EventRecordJson {
                    s3: S3Entity {
                        bucket: S3Bucket {
                            name: r.bucket.clone(),
                        },
                        object: S3Object { key: r.key.clone() },
                    },
                })
                .collect(),
        ),
    };

    let envelope = NotificationEnvelope {
        message: serde_json::to_string(&batch)?,
    };

    Ok(serde_json::to_string(&envelope)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_record() {
        let body = r#"{"Message":"{\"Records\":[{\"s3\":{\"bucket\":{\"name\":\"corpsmap-data-incoming\"},\"object\":{\"key\":\"test/file.csv\"}}}]}"}"#;
        let records = decode(body).unwrap();
        assert_eq!(
            records,
            vec![FileEventRecord::new("corpsmap-data-incoming", "test/file.csv")]
        );
    }

    #[test]
    fn test_decode_preserves_record_order() {
        let records: Vec<_> = (0..5)
            .map(|i| FileEventRecord::new("bucket", format!("incoming/{i}.csv")))
            .collect();
        let body = encode(&records).unwrap();

        assert_eq!(decode(&body).unwrap(), records);
    }

    #[test]
    fn test_decode_ignores_extra_notification_fields() {
        let inner = r#"{"Records":[{"eventVersion":"2.1","eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectCreated:Put","s3":{"s3SchemaVersion":"1.0","bucket":{"name":"b","arn":"arn:aws:s3:::b"},"object":{"key":"k.csv","size":42,"eTag":"abc"}}}]}"#;
        let body = serde_json::json!({
            "Type": "Notification",
            "MessageId": "22b80b92-fdea-4c2c-8f9d-bdfb0c7bf324",
            "TopicArn": "arn:aws:sns:us-east-1:123456789012:uploads",
            "Message": inner,
            "Timestamp": "2024-01-01T00:00:00.000Z"
        })
        .to_string();

        assert_eq!(decode(&body).unwrap(), vec![FileEventRecord::new("b", "k.csv")]);
    }

    #[test]
    fn test_decode_test_event_without_records() {
        let body = serde_json::json!({
            "Message": r#"{"Service":"Amazon S3","Event":"s3:TestEvent","Bucket":"b"}"#
        })
        .to_string();
        assert!(decode(&body).unwrap().is_empty());
    }

    #[test]
    fn test_decode_null_records_is_empty() {
        let body = serde_json::json!({ "Message": r#"{"Records":null}"# }).to_string();
        assert!(decode(&body).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_non_json_body() {
        let err = decode("not json").unwrap_err();
        assert!(matches!(err, LoaderError::EnvelopeDecode(msg) if msg.contains("envelope")));
    }

    #[test]
    fn test_decode_rejects_missing_message_field() {
        let err = decode(r#"{"Subject":"hello"}"#).unwrap_err();
        assert!(matches!(err, LoaderError::EnvelopeDecode(_)));
    }

    #[test]
    fn test_decode_rejects_malformed_inner_message() {
        let body = serde_json::json!({ "Message": "{\"Records\": [" }).to_string();
        let err = decode(&body).unwrap_err();
        assert!(
            matches!(err, LoaderError::EnvelopeDecode(msg) if msg.contains("file event batch"))
        );
    }

    #[test]
    fn test_decode_rejects_empty_key() {
        let body = encode(&[FileEventRecord::new("bucket", "")]).unwrap();
        let err = decode(&body).unwrap_err();
        assert!(matches!(err, LoaderError::EnvelopeDecode(msg) if msg.contains("object key")));
    }

    #[test]
    fn test_record_display() {
        let record = FileEventRecord::new("bucket", "test/file.csv");
        assert_eq!(record.to_string(), "s3://bucket/test/file.csv");
    }
}
