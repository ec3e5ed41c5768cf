//! Concurrent dispatch of batches to a record store.

use crate::batch::Batch;
use crate::metrics_defs::{
    BATCH_WRITE_DURATION, BATCHES_FAILED, BATCHES_SUBMITTED, RECORDS_REJECTED, RECORDS_WRITTEN,
};
use crate::store::{RecordStore, RejectedRecord};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// How a single batch fared
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOutcome {
    Succeeded,
    /// The call went through but some records were not written
    PartiallyFailed { rejected: Vec<RejectedRecord> },
    /// The call itself failed. Nothing from the batch counts as written.
    Failed { error: String },
}

impl BatchOutcome {
    fn label(&self) -> &'static str {
        match self {
            BatchOutcome::Succeeded => "succeeded",
            BatchOutcome::PartiallyFailed { .. } => "partially_failed",
            BatchOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchReport {
    pub index: usize,
    /// Records submitted in the batch
    pub size: usize,
    /// Records the store confirmed as written
    pub written: usize,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    fn failed(index: usize, size: usize, error: String) -> Self {
        BatchReport {
            index,
            size,
            written: 0,
            outcome: BatchOutcome::Failed { error },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Succeeded)
    }
}

/// Issues one bulk-write per batch and waits for all of them.
///
/// Batches are written concurrently, at most `max_in_flight` at a time.
/// A failing batch never stops its siblings from being submitted, and
/// every spawned write is awaited before `write_all` returns.
#[derive(Clone)]
pub struct BulkWriter {
    store: Arc<dyn RecordStore>,
    permits: Arc<Semaphore>,
}

impl BulkWriter {
    pub fn new(store: Arc<dyn RecordStore>, max_in_flight: NonZeroUsize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_in_flight.get())),
        }
    }

    /// Writes every batch and returns the reports ordered by batch index.
    pub async fn write_all<I>(&self, batches: I) -> Vec<BatchReport>
    where
        I: Iterator<Item = Batch>,
    {
        let mut join_set = JoinSet::new();
        // Maps task ids to (batch index, batch size) so a panicked task can
        // still be reported
        let mut task_batches: HashMap<tokio::task::Id, (usize, usize)> = HashMap::new();

        for batch in batches {
            // The semaphore is never closed, so this only waits for a slot
            let permit = self.permits.clone().acquire_owned().await.ok();
            let store = self.store.clone();
            let (index, size) = (batch.index(), batch.len());

            counter!(BATCHES_SUBMITTED).increment(1);
            tracing::debug!(batch_index = index, size, "Submitting batch");

            let abort_handle = join_set.spawn(async move {
                let _permit = permit;
                write_batch(store.as_ref(), batch).await
            });
            task_batches.insert(abort_handle.id(), (index, size));
        }

        let mut reports = Vec::with_capacity(task_batches.len());

        while let Some(join_result) = join_set.join_next_with_id().await {
            match join_result {
                Ok((task_id, report)) => {
                    task_batches.remove(&task_id);
                    reports.push(report);
                }
                Err(e) => {
                    tracing::error!("Batch write task failed: {e}");
                    if let Some((index, size)) = task_batches.remove(&e.id()) {
                        counter!(BATCHES_FAILED, "outcome" => "failed").increment(1);
                        counter!(RECORDS_REJECTED).increment(size as u64);
                        reports.push(BatchReport::failed(index, size, e.to_string()));
                    }
                }
            }
        }

        reports.sort_by_key(|report| report.index);
        reports
    }
}

async fn write_batch(store: &dyn RecordStore, batch: Batch) -> BatchReport {
    let (index, size) = (batch.index(), batch.len());
    let started = Instant::now();

    let (written, outcome) = match store.batch_write(&batch).await {
        Ok(outcome) if outcome.is_complete() => (outcome.written, BatchOutcome::Succeeded),
        Ok(outcome) => {
            tracing::warn!(
                batch_index = index,
                rejected = outcome.rejected.len(),
                store = store.name(),
                "Store rejected records"
            );
            (
                outcome.written,
                BatchOutcome::PartiallyFailed {
                    rejected: outcome.rejected,
                },
            )
        }
        Err(e) => {
            tracing::error!(
                batch_index = index,
                size,
                store = store.name(),
                error = %e,
                "Bulk write failed"
            );
            (
                0,
                BatchOutcome::Failed {
                    error: e.to_string(),
                },
            )
        }
    };

    let label = outcome.label();
    histogram!(BATCH_WRITE_DURATION, "outcome" => label).record(started.elapsed().as_secs_f64());

    let report = BatchReport {
        index,
        size,
        written,
        outcome,
    };

    counter!(RECORDS_WRITTEN).increment(written as u64);
    counter!(RECORDS_REJECTED).increment(size.saturating_sub(written) as u64);
    if !report.is_success() {
        counter!(BATCHES_FAILED, "outcome" => label).increment(1);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::store::WriteOutcome;
    use crate::store::memory::MemoryStore;
    use crate::testutils::records;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn batches(sizes: &[usize]) -> Vec<Batch> {
        let mut all = records(sizes.iter().sum()).into_iter();
        sizes
            .iter()
            .enumerate()
            .map(|(index, size)| Batch::new(index, all.by_ref().take(*size).collect()))
            .collect()
    }

    fn writer(store: Arc<dyn RecordStore>, max_in_flight: usize) -> BulkWriter {
        BulkWriter::new(store, NonZeroUsize::new(max_in_flight).unwrap())
    }

    #[tokio::test]
    async fn test_all_batches_succeed() {
        let store = Arc::new(MemoryStore::new());
        let reports = writer(store.clone(), 4)
            .write_all(batches(&[25, 25, 2]).into_iter())
            .await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(BatchReport::is_success));
        assert_eq!(reports.iter().map(|r| r.written).sum::<usize>(), 52);
        assert_eq!(store.len(), 52);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_siblings() {
        let store = Arc::new(MemoryStore::new().failing_batches([0]));
        let reports = writer(store.clone(), 1)
            .write_all(batches(&[25, 25, 2]).into_iter())
            .await;

        let indices: Vec<usize> = reports.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        assert!(matches!(reports[0].outcome, BatchOutcome::Failed { .. }));
        assert_eq!(reports[0].written, 0);
        assert!(reports[1].is_success());
        assert!(reports[2].is_success());
        assert_eq!(store.calls(), 3);
        assert_eq!(store.len(), 27);
    }

    #[tokio::test]
    async fn test_partial_rejection() {
        // tag-3 and tag-17 both fall into the first batch
        let store = Arc::new(MemoryStore::new().rejecting(["tag-3", "tag-17"]));
        let reports = writer(store.clone(), 2)
            .write_all(batches(&[25, 25]).into_iter())
            .await;

        assert_eq!(
            reports[0].outcome,
            BatchOutcome::PartiallyFailed {
                rejected: vec![
                    RejectedRecord::new("tag-3", "1700000000"),
                    RejectedRecord::new("tag-17", "1700000000"),
                ]
            }
        );
        assert_eq!(reports[0].written, 23);
        assert!(reports[1].is_success());
        assert_eq!(store.len(), 48);
    }

    #[tokio::test]
    async fn test_no_batches() {
        let store = Arc::new(MemoryStore::new());
        let reports = writer(store.clone(), 1).write_all(std::iter::empty()).await;

        assert!(reports.is_empty());
        assert_eq!(store.calls(), 0);
    }

    /// Tracks how many writes overlap in time
    #[derive(Default)]
    struct SlowStore {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for SlowStore {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn max_batch_size(&self) -> usize {
            25
        }

        async fn batch_write(&self, batch: &Batch) -> Result<WriteOutcome, StoreError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(WriteOutcome::all_written(batch.len()))
        }
    }

    #[tokio::test]
    async fn test_in_flight_limit() {
        let store = Arc::new(SlowStore::default());
        let reports = writer(store.clone(), 2)
            .write_all(batches(&[1, 1, 1, 1, 1, 1]).into_iter())
            .await;

        assert_eq!(reports.len(), 6);
        assert!(store.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
    }

    struct PanickingStore;

    #[async_trait]
    impl RecordStore for PanickingStore {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn max_batch_size(&self) -> usize {
            25
        }

        async fn batch_write(&self, batch: &Batch) -> Result<WriteOutcome, StoreError> {
            if batch.index() == 1 {
                panic!("store exploded");
            }
            Ok(WriteOutcome::all_written(batch.len()))
        }
    }

    #[tokio::test]
    async fn test_panicked_write_is_reported() {
        let reports = writer(Arc::new(PanickingStore), 4)
            .write_all(batches(&[2, 3, 4]).into_iter())
            .await;

        assert_eq!(reports.len(), 3);
        assert!(reports[0].is_success());
        assert!(matches!(reports[1].outcome, BatchOutcome::Failed { .. }));
        assert_eq!(reports[1].size, 3);
        assert!(reports[2].is_success());
    }
}
