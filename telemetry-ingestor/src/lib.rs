//! Sensor-tag telemetry ingestion.
//!
//! Gateways upload one message per scan, mapping tag identifiers to readings.
//! Each invocation flattens those messages into per-tag records, groups the
//! records into fixed-size batches and bulk-writes every batch to a
//! key-value store, then reports what was written, rejected or skipped.
//!
//! ```text
//! RawMessage* ──flatten──▶ FlattenedRecord* ──Batcher──▶ Batch* ──BulkWriter──▶ RecordStore
//!                                                                     │
//!                                                     BatchReport* ◀──┘──▶ IngestSummary
//! ```

pub mod batch;
pub mod config;
pub mod errors;
pub mod flatten;
pub mod ingestor;
pub mod message;
pub mod metrics_defs;
pub mod store;
pub mod summary;
pub mod writer;

#[cfg(test)]
mod testutils;

pub use config::Config;
pub use ingestor::Ingestor;
pub use message::RawMessage;
pub use summary::IngestSummary;
