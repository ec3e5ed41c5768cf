use crate::message::MalformedMessageError;
use crate::store::RejectedRecord;
use crate::writer::{BatchOutcome, BatchReport};
use serde::Serialize;
use std::fmt;

/// A batch that was not fully written
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub batch_index: usize,
    pub error: String,
    /// Records the store rejected. Empty when the whole call failed.
    pub rejected_records: Vec<RejectedRecord>,
}

/// Result of one invocation, returned to the caller as JSON
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub messages_processed: usize,
    pub records_flattened: usize,
    pub records_written: usize,
    pub batches_submitted: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    pub failures: Vec<BatchFailure>,
    pub skipped_messages: Vec<String>,
}

impl IngestSummary {
    pub fn new(
        messages_processed: usize,
        records_flattened: usize,
        reports: &[BatchReport],
        skipped: &[MalformedMessageError],
    ) -> Self {
        let failures: Vec<BatchFailure> = reports
            .iter()
            .filter_map(BatchFailure::from_report)
            .collect();

        IngestSummary {
            messages_processed,
            records_flattened,
            records_written: reports.iter().map(|r| r.written).sum(),
            batches_submitted: reports.len(),
            batches_succeeded: reports.len() - failures.len(),
            batches_failed: failures.len(),
            failures,
            skipped_messages: skipped.iter().map(|e| e.message_id.clone()).collect(),
        }
    }

    /// True when every message was valid and every record was written
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped_messages.is_empty()
    }
}

impl BatchFailure {
    fn from_report(report: &BatchReport) -> Option<Self> {
        match &report.outcome {
            BatchOutcome::Succeeded => None,
            BatchOutcome::PartiallyFailed { rejected } => Some(BatchFailure {
                batch_index: report.index,
                error: format!(
                    "{} of {} records were not written",
                    rejected.len(),
                    report.size
                ),
                rejected_records: rejected.clone(),
            }),
            BatchOutcome::Failed { error } => Some(BatchFailure {
                batch_index: report.index,
                error: error.clone(),
                rejected_records: Vec::new(),
            }),
        }
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Successfully processed {} messages.", self.messages_processed)?;
        if !self.skipped_messages.is_empty() {
            write!(f, " Skipped {} malformed messages.", self.skipped_messages.len())?;
        }
        if self.batches_failed > 0 {
            write!(
                f,
                " {} of {} batches failed, {} of {} records written.",
                self.batches_failed,
                self.batches_submitted,
                self.records_written,
                self.records_flattened
            )?;
        }
        Ok(())
    }
}
