//! Invocation orchestration: flatten, batch, write, summarize.

use crate::batch::Batcher;
use crate::config::{Config, ValidationError};
use crate::flatten::flatten;
use crate::message::RawMessage;
use crate::store::{self, RecordStore};
use crate::summary::IngestSummary;
use crate::writer::BulkWriter;
use aws_lambda_events::event::sqs::SqsEvent;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Runs one ingestion per invocation against a shared store.
///
/// The store handle is built once per process and reused by every
/// invocation. Invocations keep no state between calls.
#[derive(Clone)]
pub struct Ingestor {
    batch_size: NonZeroUsize,
    writer: BulkWriter,
}

impl Ingestor {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>) -> Result<Self, ValidationError> {
        config.validate()?;

        let batch_size = config.batch_size()?;
        let max = store.max_batch_size();
        if batch_size.get() > max {
            return Err(ValidationError::BatchSizeExceedsStoreLimit {
                size: batch_size.get(),
                max,
            });
        }

        Ok(Self {
            batch_size,
            writer: BulkWriter::new(store, config.in_flight_batches()?),
        })
    }

    /// Validates the configuration and connects the configured store.
    pub async fn from_config(config: &Config) -> Result<Self, ValidationError> {
        config.validate()?;
        let store = store::from_config(&config.store).await;
        Self::new(config, store)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Ingests one invocation's messages.
    ///
    /// Returns only after every bulk-write has settled.
    pub async fn ingest<I>(&self, messages: I) -> IngestSummary
    where
        I: IntoIterator<Item = RawMessage>,
    {
        let mut batches = Batcher::new(flatten(messages), self.batch_size);
        let reports = self.writer.write_all(&mut batches).await;
        let flattener = batches.into_inner();

        let summary = IngestSummary::new(
            flattener.messages_processed(),
            flattener.records_flattened(),
            &reports,
            flattener.skipped(),
        );

        tracing::info!(
            messages_processed = summary.messages_processed,
            messages_skipped = summary.skipped_messages.len(),
            records_flattened = summary.records_flattened,
            records_written = summary.records_written,
            batches_submitted = summary.batches_submitted,
            batches_failed = summary.batches_failed,
            "{summary}"
        );

        summary
    }

    pub async fn ingest_sqs(&self, event: SqsEvent) -> IngestSummary {
        self.ingest(event.records.into_iter().map(RawMessage::from))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::RejectedRecord;
    use crate::store::memory::MemoryStore;
    use crate::testutils::{gateway_message, message_with_tags, messages};

    fn config(max_batch_size: usize) -> Config {
        Config {
            max_batch_size,
            max_in_flight_batches: 4,
            store: StoreConfig::Memory,
        }
    }

    fn ingestor(store: Arc<MemoryStore>) -> Ingestor {
        Ingestor::new(&config(25), store).unwrap()
    }

    #[tokio::test]
    async fn test_52_records_make_three_batches() {
        let store = Arc::new(MemoryStore::new());
        let summary = ingestor(store.clone()).ingest(messages(52)).await;

        assert_eq!(summary.messages_processed, 52);
        assert_eq!(summary.records_flattened, 52);
        assert_eq!(summary.records_written, 52);
        assert_eq!(summary.batches_submitted, 3);
        assert_eq!(summary.batches_succeeded, 3);
        assert_eq!(summary.batches_failed, 0);
        assert!(summary.is_complete());

        assert_eq!(store.calls(), 3);
        let ids: Vec<String> = store.records().iter().map(|r| r.id().to_string()).collect();
        let expected: Vec<String> = (0..52).map(|i| format!("tag-{i}")).collect();
        // Batches may complete in any order, so compare as sets
        let mut sorted = ids.clone();
        sorted.sort();
        let mut expected_sorted = expected;
        expected_sorted.sort();
        assert_eq!(sorted, expected_sorted);
    }

    #[tokio::test]
    async fn test_one_malformed_message_among_three() {
        let store = Arc::new(MemoryStore::new());
        let input = vec![
            message_with_tags("msg-0", &["a1", "a2"]),
            gateway_message("msg-1", "not json"),
            message_with_tags("msg-2", &["c1", "c2", "c3"]),
        ];

        let summary = ingestor(store.clone()).ingest(input).await;

        assert_eq!(summary.messages_processed, 2);
        assert_eq!(summary.skipped_messages, vec!["msg-1".to_string()]);
        assert_eq!(summary.records_flattened, 5);
        assert_eq!(summary.records_written, 5);

        let ids: Vec<String> = store.records().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["a1", "a2", "c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_partial_rejection_is_isolated() {
        let store = Arc::new(MemoryStore::new().rejecting(["tag-5", "tag-9"]));
        let summary = ingestor(store.clone()).ingest(messages(60)).await;

        assert_eq!(summary.batches_submitted, 3);
        assert_eq!(summary.batches_succeeded, 2);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.records_written, 58);

        assert_eq!(summary.failures.len(), 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.batch_index, 0);
        assert_eq!(
            failure.rejected_records,
            vec![
                RejectedRecord::new("tag-5", "1700000000"),
                RejectedRecord::new("tag-9", "1700000000"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_is_reported() {
        let store = Arc::new(MemoryStore::new().failing_batches([1]));
        let summary = ingestor(store.clone()).ingest(messages(52)).await;

        assert_eq!(summary.batches_submitted, 3);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.records_written, 27);
        assert_eq!(summary.failures[0].batch_index, 1);
        assert!(summary.failures[0].rejected_records.is_empty());
        assert!(summary.failures[0].error.contains("injected failure"));
    }

    #[tokio::test]
    async fn test_no_messages() {
        let store = Arc::new(MemoryStore::new());
        let summary = ingestor(store.clone()).ingest(Vec::new()).await;

        assert_eq!(summary, IngestSummary::default());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_messages_without_tags() {
        let store = Arc::new(MemoryStore::new());
        let input = vec![gateway_message("msg-0", "{}"), gateway_message("msg-1", "{}")];
        let summary = ingestor(store.clone()).ingest(input).await;

        assert_eq!(summary.messages_processed, 2);
        assert_eq!(summary.records_flattened, 0);
        assert_eq!(summary.batches_submitted, 0);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_resubmission_duplicates_records() {
        // Writes carry no idempotency key, so replaying input stores it again
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());

        ingestor.ingest(messages(30)).await;
        ingestor.ingest(messages(30)).await;

        assert_eq!(store.len(), 60);
        assert_eq!(store.count_id("tag-0"), 2);
    }

    #[tokio::test]
    async fn test_ingest_sqs_event() {
        let event: SqsEvent = serde_json::from_str(
            r#"{"Records": [
                {
                    "messageId": "m-1",
                    "body": "{\"tag-a\": {\"temperature\": 1}, \"tag-b\": {\"temperature\": 2}}",
                    "attributes": {},
                    "messageAttributes": {
                        "gwmac": {"stringValue": "gw-1", "stringListValues": [], "binaryListValues": [], "dataType": "String"},
                        "coordinates": {"stringValue": "0,0", "stringListValues": [], "binaryListValues": [], "dataType": "String"},
                        "timestamp": {"stringValue": "1700000000", "stringListValues": [], "binaryListValues": [], "dataType": "String"}
                    }
                },
                {
                    "messageId": "m-2",
                    "body": "{\"tag-c\": {\"temperature\": 3}}",
                    "attributes": {},
                    "messageAttributes": {}
                }
            ]}"#,
        )
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        let summary = ingestor(store.clone()).ingest_sqs(event).await;

        assert_eq!(summary.messages_processed, 1);
        assert_eq!(summary.records_flattened, 2);
        assert_eq!(summary.skipped_messages, vec!["m-2".to_string()]);
        assert_eq!(store.count_id("tag-a"), 1);
        assert_eq!(store.records()[0].gwmac(), "gw-1");
    }

    #[test]
    fn test_invalid_configuration() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());

        assert!(matches!(
            Ingestor::new(&config(0), store.clone()),
            Err(ValidationError::InvalidBatchSize)
        ));
        assert!(matches!(
            Ingestor::new(&config(26), store),
            Err(ValidationError::BatchSizeExceedsStoreLimit { size: 26, max: 25 })
        ));
    }

    #[tokio::test]
    async fn test_from_config() {
        let ingestor = Ingestor::from_config(&config(10)).await.unwrap();
        assert_eq!(ingestor.batch_size(), 10);

        let summary = ingestor.ingest(messages(21)).await;
        assert_eq!(summary.batches_submitted, 3);
    }
}
