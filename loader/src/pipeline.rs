//! Poll loop - the at-least-once delivery pipeline
//!
//! One message is in flight at a time:
//!
//! ```text
//! receive ──► decode envelope ──► for each file: fetch + parse ──► POST
//!                                                                   │
//!              all files answered 201 ──► delete message ◄──────────┘
//!              anything failed        ──► leave message; lease expiry redelivers it
//! ```
//!
//! A message that fails after some of its files were posted will post those
//! files again when it is redelivered.
//!
//! # Example
//!
//! ```ignore
//! let loader = Loader::new(queue, source, poster)
//!     .wait_time(Duration::from_secs(20))
//!     .visibility_timeout(Duration::from_secs(30));
//!
//! loader.run(shutdown_token).await?;
//! ```

use crate::envelope::{self, FileEventRecord};
use crate::error::{LoaderError, Result};
use crate::ingest::CsvTransformer;
use crate::metrics;
use crate::post::Poster;
use crate::queue::{MessageQueue, QueueMessage, ReceiveOptions};
use crate::source::ObjectSource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Pause after a failed receive before polling again
const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Processing stage of one queue message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Received,
    Decoding,
    Transforming,
    Posting,
    /// Every file posted; message deleted (or delete attempted)
    Succeeded,
    /// Message left in the queue for redelivery
    Failed,
}

impl MessageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageState::Succeeded | MessageState::Failed)
    }
}

/// Totals for one fully processed message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSummary {
    pub files: usize,
    pub collections: usize,
    pub measurements: usize,
}

/// When the poll loop last went back to the queue
///
/// Cloned handles share one clock; the health endpoint reads it.
#[derive(Debug, Clone, Default)]
pub struct Heartbeat(Arc<Mutex<Option<Instant>>>);

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self) {
        *self.0.lock() = Some(Instant::now());
    }

    /// Time since the last beat, `None` before the loop has started
    pub fn since_last(&self) -> Option<Duration> {
        self.0.lock().map(|at| at.elapsed())
    }
}

/// The loader - owns the queue, transformer and poster for the poll loop
pub struct Loader {
    queue: Arc<dyn MessageQueue>,
    transformer: CsvTransformer,
    poster: Arc<dyn Poster>,
    options: ReceiveOptions,
    error_backoff: Duration,
    heartbeat: Heartbeat,
}

impl Loader {
    /// Create a loader with default receive options (one message, 20s wait, 30s lease)
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        source: Arc<dyn ObjectSource>,
        poster: Arc<dyn Poster>,
    ) -> Self {
        Self {
            queue,
            transformer: CsvTransformer::new(source),
            poster,
            options: ReceiveOptions::default(),
            error_backoff: DEFAULT_ERROR_BACKOFF,
            heartbeat: Heartbeat::new(),
        }
    }

    /// Set the long-poll wait per receive
    pub fn wait_time(mut self, wait_time: Duration) -> Self {
        self.options.wait_time = wait_time;
        self
    }

    /// Set the lease requested for each received message
    pub fn visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.options.visibility_timeout = visibility_timeout;
        self
    }

    /// Set the pause after a failed receive
    pub fn error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    pub fn receive_options(&self) -> &ReceiveOptions {
        &self.options
    }

    /// Handle on the loop's heartbeat, beaten before every receive
    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat.clone()
    }

    /// Longest healthy gap between two heartbeats
    ///
    /// One long-poll, one full lease spent on a message, then one back-off.
    /// A loop quiet for longer is holding a message past its lease.
    pub fn stall_after(&self) -> Duration {
        self.options.wait_time + self.options.visibility_timeout + self.error_backoff
    }

    /// Run the poll loop until `shutdown` is cancelled
    ///
    /// Cancellation interrupts a pending receive or back-off, but a message
    /// already being processed is always finished first.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            queue = self.queue.name(),
            poster = self.poster.name(),
            wait_time_secs = self.options.wait_time.as_secs(),
            visibility_timeout_secs = self.options.visibility_timeout.as_secs(),
            "Loader started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            self.heartbeat.beat();

            debug!("Calling receive");
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.queue.receive(&self.options) => result,
            };

            match received {
                Ok(messages) => {
                    debug!(count = messages.len(), "Received messages");
                    for message in &messages {
                        self.handle(message).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Receive failed");
                    metrics::try_record_failure(e.kind());
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        info!("Loader stopped");
        Ok(())
    }

    /// Receive once and handle whatever arrives
    ///
    /// Returns the terminal state of each handled message.
    pub async fn poll_once(&self) -> Result<Vec<MessageState>> {
        let messages = self.queue.receive(&self.options).await?;
        let mut states = Vec::with_capacity(messages.len());
        for message in &messages {
            states.push(self.handle(message).await);
        }
        Ok(states)
    }

    /// Drive one message to a terminal state
    ///
    /// The message is deleted only when every file it announces was posted.
    pub async fn handle(&self, message: &QueueMessage) -> MessageState {
        metrics::try_record_received();
        info!(message_id = %message.id, "Working on message");

        let mut state = MessageState::Received;
        match self.process(message, &mut state).await {
            Ok(summary) => {
                info!(
                    message_id = %message.id,
                    files = summary.files,
                    series = summary.collections,
                    measurements = summary.measurements,
                    "Message processed"
                );

                if let Err(e) = self.queue.delete(message).await {
                    error!(
                        message_id = %message.id,
                        error = %e,
                        "Failed to delete processed message, it will be redelivered"
                    );
                    metrics::try_record_delete_failure();
                }

                metrics::try_record_processed("succeeded");
                MessageState::Succeeded
            }
            Err(Failure { error: e, file }) => {
                let (bucket, key) = match &file {
                    Some(file) => (Some(file.bucket.as_str()), Some(file.key.as_str())),
                    None => (None, None),
                };
                let (row, line, status) = match &e {
                    LoaderError::RowParse { row, line, .. } => (Some(*row), Some(*line), None),
                    LoaderError::ApiRejection { status, .. } => (None, None, Some(*status)),
                    _ => (None, None, None),
                };

                error!(
                    message_id = %message.id,
                    stage = ?state,
                    kind = e.kind(),
                    bucket,
                    key,
                    row,
                    line,
                    status,
                    error = %e,
                    "Message failed, leaving it for redelivery"
                );
                metrics::try_record_failure(e.kind());
                metrics::try_record_processed("failed");
                MessageState::Failed
            }
        }
    }

    async fn process(
        &self,
        message: &QueueMessage,
        state: &mut MessageState,
    ) -> std::result::Result<MessageSummary, Failure> {
        *state = MessageState::Decoding;
        let records = envelope::decode(&message.body).map_err(Failure::message)?;
        debug!(message_id = %message.id, records = records.len(), "Decoded envelope");

        let mut summary = MessageSummary::default();

        for record in records {
            info!(
                message_id = %message.id,
                bucket = %record.bucket,
                key = %record.key,
                "Processing file"
            );

            *state = MessageState::Transforming;
            let file = match self.transformer.transform(&record).await {
                Ok(file) => file,
                Err(e) => return Err(Failure::file(e, record)),
            };

            *state = MessageState::Posting;
            let report = match self.poster.post(&file.collections).await {
                Ok(report) => report,
                Err(e) => return Err(Failure::file(e, record)),
            };

            info!(
                message_id = %message.id,
                key = %record.key,
                measurements = file.row_count,
                series = report.collections,
                elapsed_secs = report.elapsed.as_secs_f64(),
                "Posted measurements"
            );
            metrics::try_record_posted(report.measurements, report.elapsed.as_secs_f64());

            summary.files += 1;
            summary.collections += report.collections;
            summary.measurements += report.measurements;
        }

        Ok(summary)
    }
}

/// Why a message failed, and which file it was on
struct Failure {
    error: LoaderError,
    file: Option<FileEventRecord>,
}

impl Failure {
    fn message(error: LoaderError) -> Self {
        Self { error, file: None }
    }

    fn file(error: LoaderError, file: FileEventRecord) -> Self {
        Self {
            error,
            file: Some(file),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::measurement::MeasurementCollection;
    use crate::post::PostReport;
    use crate::queue::MemoryQueue;
    use crate::source::MemoryObjectSource;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const GOOD_FILE: &str = "11111111-1111-1111-1111-111111111111,2024-01-01T00:00:00Z,1.5\n\
                             11111111-1111-1111-1111-111111111111,2024-01-01T00:01:00Z,2.0\n";

    /// Poster that records payloads and answers with a fixed status
    struct RecordingPoster {
        status: u16,
        posts: Mutex<Vec<Vec<MeasurementCollection>>>,
    }

    impl RecordingPoster {
        fn answering(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                posts: Mutex::new(Vec::new()),
            })
        }

        fn post_count(&self) -> usize {
            self.posts.lock().len()
        }
    }

    #[async_trait]
    impl Poster for RecordingPoster {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn post(&self, collections: &[MeasurementCollection]) -> Result<PostReport> {
            self.posts.lock().push(collections.to_vec());
            if self.status == 201 {
                Ok(PostReport::new(201, collections, Duration::ZERO))
            } else {
                Err(LoaderError::ApiRejection {
                    status: self.status,
                    body: String::new(),
                })
            }
        }
    }

    /// Queue whose deletes always fail
    struct StuckQueue(MemoryQueue);

    #[async_trait]
    impl MessageQueue for StuckQueue {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn receive(&self, options: &ReceiveOptions) -> Result<Vec<QueueMessage>> {
            self.0.receive(options).await
        }

        async fn delete(&self, message: &QueueMessage) -> Result<()> {
            Err(LoaderError::Queue(format!("delete of {} refused", message.id)))
        }

        async fn send(&self, body: &str) -> Result<String> {
            self.0.send(body).await
        }
    }

    struct Fixture {
        queue: Arc<MemoryQueue>,
        source: Arc<MemoryObjectSource>,
        poster: Arc<RecordingPoster>,
        loader: Loader,
    }

    fn fixture(status: u16) -> Fixture {
        let queue = Arc::new(MemoryQueue::new());
        let source = Arc::new(MemoryObjectSource::new());
        let poster = RecordingPoster::answering(status);
        let loader = Loader::new(queue.clone(), source.clone(), poster.clone())
            .wait_time(Duration::from_millis(20))
            .visibility_timeout(Duration::from_secs(30));
        Fixture {
            queue,
            source,
            poster,
            loader,
        }
    }

    fn envelope_for(keys: &[&str]) -> String {
        let records: Vec<_> = keys
            .iter()
            .map(|k| FileEventRecord::new("bucket", *k))
            .collect();
        envelope::encode(&records).unwrap()
    }

    #[tokio::test]
    async fn test_success_deletes_message() {
        let f = fixture(201);
        f.source.put("bucket", "test/file.csv", GOOD_FILE);
        let id = f.queue.push(envelope_for(&["test/file.csv"]));

        let states = f.loader.poll_once().await.unwrap();
        assert_eq!(states, vec![MessageState::Succeeded]);
        assert!(!f.queue.contains(&id));
        assert_eq!(f.poster.post_count(), 1);
        assert_eq!(f.poster.posts.lock()[0][0].items.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_failure_still_succeeds() {
        let queue = Arc::new(StuckQueue(MemoryQueue::new()));
        let source = Arc::new(MemoryObjectSource::new());
        let poster = RecordingPoster::answering(201);
        let loader = Loader::new(queue.clone(), source.clone(), poster.clone())
            .wait_time(Duration::from_millis(20));

        source.put("bucket", "test/file.csv", GOOD_FILE);
        let id = queue.0.push(envelope_for(&["test/file.csv"]));

        let states = loader.poll_once().await.unwrap();
        assert_eq!(states, vec![MessageState::Succeeded]);
        assert!(queue.0.contains(&id), "message stays queued for redelivery");
        assert_eq!(queue.0.len(), 1);
        assert_eq!(poster.post_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_carries_file_and_stage() {
        let f = fixture(500);
        f.source.put("bucket", "a.csv", GOOD_FILE);
        f.source.put("bucket", "b.csv", GOOD_FILE);
        let message = QueueMessage {
            id: "m-1".to_string(),
            receipt_handle: "r-1".to_string(),
            body: envelope_for(&["a.csv", "b.csv"]),
        };

        let mut state = MessageState::Received;
        let failure = f.loader.process(&message, &mut state).await.err().unwrap();
        assert_eq!(state, MessageState::Posting);
        assert!(matches!(failure.error, LoaderError::ApiRejection { status: 500, .. }));
        assert_eq!(failure.file, Some(FileEventRecord::new("bucket", "a.csv")));

        let message = QueueMessage {
            body: "not an envelope".to_string(),
            ..message
        };
        let mut state = MessageState::Received;
        let failure = f.loader.process(&message, &mut state).await.err().unwrap();
        assert_eq!(state, MessageState::Decoding);
        assert!(matches!(failure.error, LoaderError::EnvelopeDecode(_)));
        assert!(failure.file.is_none());
    }

    #[tokio::test]
    async fn test_empty_receive_handles_nothing() {
        let f = fixture(201);
        assert!(f.loader.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_not_deleted() {
        let f = fixture(201);
        let id = f.queue.push("definitely not an envelope");

        let states = f.loader.poll_once().await.unwrap();
        assert_eq!(states, vec![MessageState::Failed]);
        assert!(f.queue.contains(&id));
        assert_eq!(f.poster.post_count(), 0);
    }

    #[tokio::test]
    async fn test_api_rejection_is_not_deleted() {
        let f = fixture(500);
        f.source.put("bucket", "test/file.csv", GOOD_FILE);
        let id = f.queue.push(envelope_for(&["test/file.csv"]));

        let states = f.loader.poll_once().await.unwrap();
        assert_eq!(states, vec![MessageState::Failed]);
        assert!(f.queue.contains(&id));
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_files() {
        let f = fixture(201);
        f.source.put("bucket", "a.csv", GOOD_FILE);
        f.source.put("bucket", "c.csv", GOOD_FILE);
        let id = f.queue.push(envelope_for(&["a.csv", "missing.csv", "c.csv"]));

        let states = f.loader.poll_once().await.unwrap();
        assert_eq!(states, vec![MessageState::Failed]);
        assert!(f.queue.contains(&id));
        // a.csv was posted before the failure, c.csv never was
        assert_eq!(f.poster.post_count(), 1);
        assert_eq!(f.source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_multiple_files_posted_in_order() {
        let f = fixture(201);
        f.source.put(
            "bucket",
            "a.csv",
            "11111111-1111-1111-1111-111111111111,2024-01-01T00:00:00Z,1\n",
        );
        f.source.put(
            "bucket",
            "b.csv",
            "22222222-2222-2222-2222-222222222222,2024-01-01T00:00:00Z,2\n",
        );
        f.queue.push(envelope_for(&["a.csv", "b.csv"]));

        let states = f.loader.poll_once().await.unwrap();
        assert_eq!(states, vec![MessageState::Succeeded]);

        let posts = f.poster.posts.lock();
        assert_eq!(posts.len(), 2);
        assert_eq!(
            posts[0][0].series_id,
            uuid::Uuid::from_u128(0x11111111_1111_1111_1111_111111111111)
        );
        assert_eq!(
            posts[1][0].series_id,
            uuid::Uuid::from_u128(0x22222222_2222_2222_2222_222222222222)
        );
    }

    #[tokio::test]
    async fn test_event_without_records_is_deleted() {
        let f = fixture(201);
        let id = f.queue.push(envelope_for(&[]));

        let states = f.loader.poll_once().await.unwrap();
        assert_eq!(states, vec![MessageState::Succeeded]);
        assert!(!f.queue.contains(&id));
        assert_eq!(f.poster.post_count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let f = fixture(201);
        let token = CancellationToken::new();
        let loader = Arc::new(f.loader);

        let runner = {
            let loader = Arc::clone(&loader);
            let token = token.clone();
            tokio::spawn(async move { loader.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("loop should stop promptly")
            .expect("task should not panic");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_beats_heartbeat() {
        let f = fixture(201);
        let heartbeat = f.loader.heartbeat();
        assert!(heartbeat.since_last().is_none());
        assert_eq!(f.loader.stall_after(), Duration::from_millis(20 + 30_000 + 1_000));

        let token = CancellationToken::new();
        let loader = Arc::new(f.loader);
        let runner = {
            let loader = Arc::clone(&loader);
            let token = token.clone();
            tokio::spawn(async move { loader.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        let age = heartbeat.since_last().expect("loop should have beaten");
        assert!(age < Duration::from_millis(100), "beats every receive, got {age:?}");

        token.cancel();
        runner.await.unwrap().unwrap();
    }

    #[test]
    fn test_terminal_states() {
        assert!(MessageState::Succeeded.is_terminal());
        assert!(MessageState::Failed.is_terminal());
        assert!(!MessageState::Posting.is_terminal());
    }
}
