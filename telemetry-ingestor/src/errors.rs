use thiserror::Error;

/// Errors returned by a record store for a whole bulk-write call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Bulk write request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to build write request: {0}")]
    InvalidRequest(String),

    #[error("Batch of {size} records exceeds the store limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
}
