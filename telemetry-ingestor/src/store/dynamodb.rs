//! DynamoDB-backed record store.
//!
//! Each batch becomes one `BatchWriteItem` call with a `PutRequest` per
//! record. Items DynamoDB could not write (typically because of throttling)
//! come back in `UnprocessedItems` and are reported as rejected.

use super::{RecordStore, RejectedRecord, WriteOutcome, check_batch_size};
use crate::batch::Batch;
use crate::errors::StoreError;
use crate::flatten::FlattenedRecord;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// Maximum number of items in one `BatchWriteItem` call
pub const DYNAMODB_BATCH_WRITE_LIMIT: usize = 25;

const UNKNOWN_FIELD: &str = "<unknown>";

pub struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        DynamoStore {
            client,
            table_name: table_name.into(),
        }
    }

    /// Builds a client from the default AWS configuration chain.
    pub async fn connect(
        table_name: &str,
        endpoint_url: Option<&Url>,
        region: Option<&str>,
    ) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url.as_str());
        }

        tracing::info!(
            table_name = %table_name,
            endpoint_url = ?endpoint_url.map(Url::as_str),
            "Connected DynamoDB store"
        );

        Self::new(Client::from_conf(builder.build()), table_name)
    }
}

#[async_trait]
impl RecordStore for DynamoStore {
    fn name(&self) -> &'static str {
        "dynamodb"
    }

    fn max_batch_size(&self) -> usize {
        DYNAMODB_BATCH_WRITE_LIMIT
    }

    async fn batch_write(&self, batch: &Batch) -> Result<WriteOutcome, StoreError> {
        check_batch_size(batch, DYNAMODB_BATCH_WRITE_LIMIT)?;

        let requests = batch
            .records()
            .iter()
            .map(put_request)
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table_name, requests)
            .send()
            .await
            .map_err(|e| StoreError::RequestFailed(DisplayErrorContext(&e).to_string()))?;

        let rejected: Vec<RejectedRecord> = output
            .unprocessed_items()
            .and_then(|items| items.get(&self.table_name))
            .map(|requests| requests.iter().map(rejected_record).collect())
            .unwrap_or_default();

        Ok(WriteOutcome {
            written: batch.len().saturating_sub(rejected.len()),
            rejected,
        })
    }
}

fn put_request(record: &FlattenedRecord) -> Result<WriteRequest, StoreError> {
    let put = PutRequest::builder()
        .set_item(Some(record_to_item(record)))
        .build()
        .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

    Ok(WriteRequest::builder().put_request(put).build())
}

pub fn record_to_item(record: &FlattenedRecord) -> HashMap<String, AttributeValue> {
    record
        .fields()
        .map(|(name, value)| (name.to_string(), to_attribute_value(value)))
        .collect()
}

/// Maps a JSON value onto the matching DynamoDB attribute type.
pub fn to_attribute_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(items) => {
            AttributeValue::L(items.into_iter().map(to_attribute_value).collect())
        }
        Value::Object(fields) => AttributeValue::M(
            fields
                .into_iter()
                .map(|(name, value)| (name, to_attribute_value(value)))
                .collect(),
        ),
    }
}

fn rejected_record(request: &WriteRequest) -> RejectedRecord {
    let item = request.put_request().map(PutRequest::item);
    let field = |name: &str| {
        item.and_then(|item| item.get(name))
            .and_then(|value| value.as_s().ok())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_FIELD.to_string())
    };

    RejectedRecord::new(field("id"), field("received"))
}
