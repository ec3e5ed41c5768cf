//! Process-local store. Used for dry runs and as the test double for the
//! bulk writer. Writes are appended without deduplication.

use super::{RecordStore, RejectedRecord, WriteOutcome, check_batch_size};
use crate::batch::Batch;
use crate::errors::StoreError;
use crate::flatten::FlattenedRecord;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mirrors the DynamoDB limit so dry runs exercise the same batching
pub const MEMORY_BATCH_WRITE_LIMIT: usize = 25;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<FlattenedRecord>>,
    calls: AtomicUsize,
    // Records with these ids are rejected individually
    rejected_ids: HashSet<String>,
    // Calls for these batch indices fail as a whole
    failing_batches: HashSet<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every record whose id is in `ids`, as a throttled store would.
    pub fn rejecting<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Fails the whole call for the given batch indices.
    pub fn failing_batches<I>(mut self, indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.failing_batches.extend(indices);
        self
    }

    /// Snapshot of every record written so far, in write order
    pub fn records(&self) -> Vec<FlattenedRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of stored records with the given id
    pub fn count_id(&self, id: &str) -> usize {
        self.lock().iter().filter(|r| r.id() == id).count()
    }

    /// Number of `batch_write` calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FlattenedRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn max_batch_size(&self) -> usize {
        MEMORY_BATCH_WRITE_LIMIT
    }

    async fn batch_write(&self, batch: &Batch) -> Result<WriteOutcome, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        check_batch_size(batch, MEMORY_BATCH_WRITE_LIMIT)?;

        if self.failing_batches.contains(&batch.index()) {
            return Err(StoreError::RequestFailed(format!(
                "injected failure for batch {}",
                batch.index()
            )));
        }

        let mut outcome = WriteOutcome::default();
        let mut stored = self.lock();
        for record in batch.records() {
            if self.rejected_ids.contains(record.id()) {
                outcome.rejected.push(RejectedRecord::from(record));
            } else {
                stored.push(record.clone());
                outcome.written += 1;
            }
        }

        Ok(outcome)
    }
}
