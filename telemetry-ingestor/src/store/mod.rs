//! Key-value stores that accept bulk writes of flattened records.

pub mod dynamodb;
pub mod memory;

use crate::batch::Batch;
use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::flatten::FlattenedRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// A record the store did not write.
///
/// One delivery can carry several scans of the same tag, so the tag id is
/// paired with the timestamp of the message the reading came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub id: String,
    pub received: String,
}

impl RejectedRecord {
    pub fn new(id: impl Into<String>, received: impl Into<String>) -> Self {
        RejectedRecord {
            id: id.into(),
            received: received.into(),
        }
    }
}

impl From<&FlattenedRecord> for RejectedRecord {
    fn from(record: &FlattenedRecord) -> Self {
        RejectedRecord::new(record.id(), record.received())
    }
}

/// Result of a bulk-write call that reached the store
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteOutcome {
    /// Records durably written
    pub written: usize,
    /// Records the store did not write, in batch order
    pub rejected: Vec<RejectedRecord>,
}

impl WriteOutcome {
    pub fn all_written(count: usize) -> Self {
        WriteOutcome {
            written: count,
            rejected: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Largest number of records accepted by one `batch_write` call
    fn max_batch_size(&self) -> usize;

    /// Writes all records of `batch` in a single call.
    ///
    /// An `Err` means the call as a whole failed and nothing may be assumed
    /// written. Individually rejected records are reported in the outcome.
    async fn batch_write(&self, batch: &Batch) -> Result<WriteOutcome, StoreError>;
}

/// Builds the store selected in the configuration.
pub async fn from_config(config: &StoreConfig) -> Arc<dyn RecordStore> {
    match config {
        StoreConfig::Dynamodb {
            table_name,
            endpoint_url,
            region,
        } => {
            let store = dynamodb::DynamoStore::connect(
                table_name,
                endpoint_url.as_ref(),
                region.as_deref(),
            )
            .await;
            Arc::new(store)
        }
        StoreConfig::Memory => {
            tracing::warn!("Using the in-memory store. Records are not persisted.");
            Arc::new(memory::MemoryStore::new())
        }
    }
}

fn check_batch_size(batch: &Batch, max: usize) -> Result<(), StoreError> {
    if batch.len() > max {
        return Err(StoreError::BatchTooLarge {
            size: batch.len(),
            max,
        });
    }
    Ok(())
}
