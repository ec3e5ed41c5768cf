use shared::metrics_defs::{MetricDef, MetricType};

pub const MESSAGES_RECEIVED: MetricDef = MetricDef {
    name: "ingest.messages.received",
    metric_type: MetricType::Counter,
    description: "Number of inbound messages read from the invocation input",
};

pub const MESSAGES_SKIPPED: MetricDef = MetricDef {
    name: "ingest.messages.skipped",
    metric_type: MetricType::Counter,
    description: "Number of malformed messages skipped during flattening",
};

pub const RECORDS_FLATTENED: MetricDef = MetricDef {
    name: "ingest.records.flattened",
    metric_type: MetricType::Counter,
    description: "Number of per-tag records produced by flattening",
};

pub const RECORDS_WRITTEN: MetricDef = MetricDef {
    name: "ingest.records.written",
    metric_type: MetricType::Counter,
    description: "Number of records confirmed written by the store",
};

pub const RECORDS_REJECTED: MetricDef = MetricDef {
    name: "ingest.records.rejected",
    metric_type: MetricType::Counter,
    description: "Number of records the store did not write",
};

pub const BATCHES_SUBMITTED: MetricDef = MetricDef {
    name: "ingest.batches.submitted",
    metric_type: MetricType::Counter,
    description: "Number of bulk-write calls issued",
};

pub const BATCHES_FAILED: MetricDef = MetricDef {
    name: "ingest.batches.failed",
    metric_type: MetricType::Counter,
    description: "Number of batches not fully written. Tagged with outcome.",
};

pub const BATCH_WRITE_DURATION: MetricDef = MetricDef {
    name: "ingest.batch.write.duration",
    metric_type: MetricType::Histogram,
    description: "Bulk-write call duration in seconds. Tagged with outcome.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    MESSAGES_RECEIVED,
    MESSAGES_SKIPPED,
    RECORDS_FLATTENED,
    RECORDS_WRITTEN,
    RECORDS_REJECTED,
    BATCHES_SUBMITTED,
    BATCHES_FAILED,
    BATCH_WRITE_DURATION,
];
