use crate::store::dynamodb::DYNAMODB_BATCH_WRITE_LIMIT;
use crate::store::memory::MEMORY_BATCH_WRITE_LIMIT;
use serde::Deserialize;
use std::num::NonZeroUsize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 25;
pub const DEFAULT_MAX_IN_FLIGHT_BATCHES: usize = 8;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("max_batch_size must be greater than 0")]
    InvalidBatchSize,

    #[error("max_batch_size {size} exceeds the store limit of {max}")]
    BatchSizeExceedsStoreLimit { size: usize, max: usize },

    #[error("max_in_flight_batches must be greater than 0")]
    InvalidInFlightBatches,

    #[error("Empty table name")]
    EmptyTableName,
}

/// Ingestor configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Records per bulk-write call. Must not exceed what the store accepts.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Upper bound on bulk-write calls awaiting a response at once
    #[serde(default = "default_max_in_flight_batches")]
    pub max_in_flight_batches: usize,
    pub store: StoreConfig,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_in_flight_batches() -> usize {
    DEFAULT_MAX_IN_FLIGHT_BATCHES
}

impl Config {
    /// Validates the ingestor configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let batch_size = self.batch_size()?;
        let max = self.store.max_batch_size();
        if batch_size.get() > max {
            return Err(ValidationError::BatchSizeExceedsStoreLimit {
                size: batch_size.get(),
                max,
            });
        }

        self.in_flight_batches()?;
        self.store.validate()
    }

    pub fn batch_size(&self) -> Result<NonZeroUsize, ValidationError> {
        NonZeroUsize::new(self.max_batch_size).ok_or(ValidationError::InvalidBatchSize)
    }

    pub fn in_flight_batches(&self) -> Result<NonZeroUsize, ValidationError> {
        NonZeroUsize::new(self.max_in_flight_batches)
            .ok_or(ValidationError::InvalidInFlightBatches)
    }
}

/// Backing key-value store
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Dynamodb {
        table_name: String,
        /// Overrides the service endpoint, e.g. for a local DynamoDB
        endpoint_url: Option<Url>,
        region: Option<String>,
    },
    /// Keeps records in process memory. Nothing is persisted.
    Memory,
}

impl StoreConfig {
    /// Largest batch the store accepts in one call
    pub fn max_batch_size(&self) -> usize {
        match self {
            StoreConfig::Dynamodb { .. } => DYNAMODB_BATCH_WRITE_LIMIT,
            StoreConfig::Memory => MEMORY_BATCH_WRITE_LIMIT,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Dynamodb { table_name, .. } if table_name.trim().is_empty() => {
                Err(ValidationError::EmptyTableName)
            }
            _ => Ok(()),
        }
    }
}
