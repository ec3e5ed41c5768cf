//! Count-based grouping of flattened records.

use crate::flatten::FlattenedRecord;
use std::num::NonZeroUsize;

/// A group of records submitted in one bulk-write call
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    index: usize,
    records: Vec<FlattenedRecord>,
}

impl Batch {
    pub fn new(index: usize, records: Vec<FlattenedRecord>) -> Self {
        Batch { index, records }
    }

    /// Zero-based position of the batch within the invocation
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn records(&self) -> &[FlattenedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<FlattenedRecord> {
        self.records
    }
}

/// Splits a record stream into batches of `size` records.
///
/// Every batch is full except possibly the last one, which holds the
/// remainder. No empty batch is ever produced.
pub struct Batcher<I> {
    records: I,
    size: NonZeroUsize,
    next_index: usize,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = FlattenedRecord>,
{
    pub fn new(records: I, size: NonZeroUsize) -> Self {
        Batcher {
            records,
            size,
            next_index: 0,
        }
    }

    /// Number of batches produced so far
    pub fn batches_emitted(&self) -> usize {
        self.next_index
    }

    pub fn into_inner(self) -> I {
        self.records
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = FlattenedRecord>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let records: Vec<FlattenedRecord> =
            self.records.by_ref().take(self.size.get()).collect();

        if records.is_empty() {
            return None;
        }

        let batch = Batch::new(self.next_index, records);
        self.next_index += 1;
        Some(batch)
    }
}
