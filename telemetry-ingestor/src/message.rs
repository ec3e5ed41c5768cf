//! Inbound gateway messages.
//!
//! A gateway uploads one message per scan. The body maps tag identifiers to
//! their readings and the envelope metadata travels as message attributes:
//!
//! ```json
//! {
//!   "messageId": "059f36b4-87a3-44ab-83d2-661975830a7d",
//!   "body": "{\"c5:a3:8f:01:22:10\": {\"temperature\": 21.5, \"rssi\": -71}}",
//!   "messageAttributes": {
//!     "gwmac": {"stringValue": "aa:bb:cc:dd:ee:ff", "dataType": "String"},
//!     "coordinates": {"stringValue": "60.1699,24.9384", "dataType": "String"},
//!     "timestamp": {"stringValue": "1700000000", "dataType": "String"}
//!   }
//! }
//! ```

use aws_lambda_events::event::sqs::SqsMessage;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub const GATEWAY_ATTRIBUTE: &str = "gwmac";
pub const COORDINATES_ATTRIBUTE: &str = "coordinates";
pub const TIMESTAMP_ATTRIBUTE: &str = "timestamp";

/// A single tag reading: arbitrary JSON fields defined by the sensor protocol
pub type Reading = Map<String, Value>;

/// A queue delivery before validation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMessage {
    /// Opaque identifier, used for tracing and for reporting skipped messages
    pub message_id: String,
    pub body: Option<String>,
    /// String-valued message attributes
    pub attributes: HashMap<String, String>,
}

impl RawMessage {
    pub fn new<I, B>(message_id: I, body: B) -> Self
    where
        I: Into<String>,
        B: Into<String>,
    {
        RawMessage {
            message_id: message_id.into(),
            body: Some(body.into()),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn attribute(&self, name: &'static str) -> Result<&str, MalformedReason> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .ok_or(MalformedReason::MissingAttribute(name))
    }
}

impl From<SqsMessage> for RawMessage {
    fn from(message: SqsMessage) -> Self {
        // Only string attributes carry envelope metadata
        let attributes = message
            .message_attributes
            .into_iter()
            .filter_map(|(name, attribute)| attribute.string_value.map(|value| (name, value)))
            .collect();

        RawMessage {
            message_id: message.message_id.unwrap_or_default(),
            body: message.body,
            attributes,
        }
    }
}

/// Why a message could not be flattened
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedReason {
    #[error("message body is missing")]
    MissingBody,

    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("reading for tag {0:?} is not a JSON object")]
    ReadingNotObject(String),

    #[error("missing message attribute {0:?}")]
    MissingAttribute(&'static str),
}

/// A message that was skipped during flattening
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed message {message_id:?} at position {position}: {reason}")]
pub struct MalformedMessageError {
    /// Zero-based position of the message in the invocation input
    pub position: usize,
    pub message_id: String,
    pub reason: MalformedReason,
}

/// A validated gateway message
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub message_id: String,
    pub gateway_id: String,
    pub coordinates: String,
    pub received_at: String,
    /// Tag readings in the order they appear in the body
    pub payload: IndexMap<String, Reading>,
}

impl InboundMessage {
    /// Validates a raw delivery found at `position` in the input.
    pub fn parse(position: usize, raw: RawMessage) -> Result<Self, MalformedMessageError> {
        Self::try_from_raw(&raw).map_err(|reason| MalformedMessageError {
            position,
            message_id: raw.message_id,
            reason,
        })
    }

    fn try_from_raw(raw: &RawMessage) -> Result<Self, MalformedReason> {
        let gateway_id = raw.attribute(GATEWAY_ATTRIBUTE)?;
        let coordinates = raw.attribute(COORDINATES_ATTRIBUTE)?;
        let received_at = raw.attribute(TIMESTAMP_ATTRIBUTE)?;

        let body = raw.body.as_deref().ok_or(MalformedReason::MissingBody)?;
        let tags: Map<String, Value> = serde_json::from_str(body)
            .map_err(|e| MalformedReason::InvalidJson(e.to_string()))?;

        let payload = tags
            .into_iter()
            .map(|(tag, reading)| match reading {
                Value::Object(fields) => Ok((tag, fields)),
                _ => Err(MalformedReason::ReadingNotObject(tag)),
            })
            .collect::<Result<IndexMap<_, _>, _>>()?;

        Ok(InboundMessage {
            message_id: raw.message_id.clone(),
            gateway_id: gateway_id.to_string(),
            coordinates: coordinates.to_string(),
            received_at: received_at.to_string(),
            payload,
        })
    }
}
