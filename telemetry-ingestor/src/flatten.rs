//! Turns gateway messages into independent per-tag records.

use crate::message::{InboundMessage, MalformedMessageError, RawMessage, Reading};
use crate::metrics_defs::{MESSAGES_RECEIVED, MESSAGES_SKIPPED, RECORDS_FLATTENED};
use serde::Serialize;
use serde_json::Value;
use shared::counter;

/// Envelope fields copied onto every record. They take precedence over
/// reading fields with the same name.
pub const ENVELOPE_FIELDS: [&str; 4] = ["id", "gwmac", "coordinates", "received"];

/// One tag reading together with the envelope of the message it came from
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlattenedRecord {
    #[serde(flatten)]
    reading: Reading,
    id: String,
    gwmac: String,
    coordinates: String,
    received: String,
}

impl FlattenedRecord {
    pub fn new(tag_id: String, mut reading: Reading, envelope: &Envelope) -> Self {
        for field in ENVELOPE_FIELDS {
            reading.remove(field);
        }

        FlattenedRecord {
            reading,
            id: tag_id,
            gwmac: envelope.gateway_id.clone(),
            coordinates: envelope.coordinates.clone(),
            received: envelope.received_at.clone(),
        }
    }

    /// The tag identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn gwmac(&self) -> &str {
        &self.gwmac
    }

    pub fn coordinates(&self) -> &str {
        &self.coordinates
    }

    pub fn received(&self) -> &str {
        &self.received
    }

    /// Reading fields without the envelope
    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    /// All fields of the record, reading fields first.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Value)> {
        let envelope = [
            ("id", &self.id),
            ("gwmac", &self.gwmac),
            ("coordinates", &self.coordinates),
            ("received", &self.received),
        ];

        self.reading
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .chain(
                envelope
                    .into_iter()
                    .map(|(name, value)| (name, Value::String(value.clone()))),
            )
    }
}

/// Message metadata shared by all records of one message
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub gateway_id: String,
    pub coordinates: String,
    pub received_at: String,
}

struct CurrentMessage {
    envelope: Envelope,
    tags: indexmap::map::IntoIter<String, Reading>,
}

impl From<InboundMessage> for CurrentMessage {
    fn from(message: InboundMessage) -> Self {
        CurrentMessage {
            envelope: Envelope {
                gateway_id: message.gateway_id,
                coordinates: message.coordinates,
                received_at: message.received_at,
            },
            tags: message.payload.into_iter(),
        }
    }
}

/// Lazy iterator over the records of a message sequence.
///
/// Records come out per message, then per tag in body order. Malformed
/// messages are skipped and kept for reporting.
pub struct Flattener<I> {
    messages: std::iter::Enumerate<I>,
    current: Option<CurrentMessage>,
    messages_processed: usize,
    records_flattened: usize,
    skipped: Vec<MalformedMessageError>,
}

/// Flattens `messages` into per-tag records.
pub fn flatten<I>(messages: I) -> Flattener<I::IntoIter>
where
    I: IntoIterator<Item = RawMessage>,
{
    Flattener {
        messages: messages.into_iter().enumerate(),
        current: None,
        messages_processed: 0,
        records_flattened: 0,
        skipped: Vec::new(),
    }
}

impl<I> Flattener<I> {
    /// Number of valid messages consumed so far
    pub fn messages_processed(&self) -> usize {
        self.messages_processed
    }

    pub fn records_flattened(&self) -> usize {
        self.records_flattened
    }

    pub fn skipped(&self) -> &[MalformedMessageError] {
        &self.skipped
    }

    pub fn into_skipped(self) -> Vec<MalformedMessageError> {
        self.skipped
    }
}

impl<I> Iterator for Flattener<I>
where
    I: Iterator<Item = RawMessage>,
{
    type Item = FlattenedRecord;

    fn next(&mut self) -> Option<FlattenedRecord> {
        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some((tag_id, reading)) = current.tags.next() {
                    self.records_flattened += 1;
                    counter!(RECORDS_FLATTENED).increment(1);
                    return Some(FlattenedRecord::new(tag_id, reading, &current.envelope));
                }
                self.current = None;
            }

            let (position, raw) = self.messages.next()?;
            counter!(MESSAGES_RECEIVED).increment(1);

            match InboundMessage::parse(position, raw) {
                Ok(message) => {
                    self.messages_processed += 1;
                    self.current = Some(message.into());
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %e.message_id,
                        position = e.position,
                        error = %e.reason,
                        "Skipping malformed message"
                    );
                    counter!(MESSAGES_SKIPPED).increment(1);
                    self.skipped.push(e);
                }
            }
        }
    }
}
