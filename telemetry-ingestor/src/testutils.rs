use crate::flatten::{Envelope, FlattenedRecord};
use crate::message::{COORDINATES_ATTRIBUTE, GATEWAY_ATTRIBUTE, RawMessage, TIMESTAMP_ATTRIBUTE};
use serde_json::{Map, Value, json};

/// A message carrying all envelope attributes and the given body.
pub fn gateway_message(message_id: &str, body: &str) -> RawMessage {
    RawMessage::new(message_id, body)
        .with_attribute(GATEWAY_ATTRIBUTE, "aa:bb:cc:dd:ee:ff")
        .with_attribute(COORDINATES_ATTRIBUTE, "60.1699,24.9384")
        .with_attribute(TIMESTAMP_ATTRIBUTE, "1700000000")
}

/// A well-formed message with one reading per tag id.
pub fn message_with_tags(message_id: &str, tags: &[&str]) -> RawMessage {
    let body: Map<String, Value> = tags
        .iter()
        .enumerate()
        .map(|(i, tag)| {
            (
                tag.to_string(),
                json!({"temperature": 20.0 + i as f64, "humidity": 40, "rssi": -70}),
            )
        })
        .collect();

    gateway_message(message_id, &Value::Object(body).to_string())
}

/// `count` messages with one tag each.
pub fn messages(count: usize) -> Vec<RawMessage> {
    (0..count)
        .map(|i| message_with_tags(&format!("msg-{i}"), &[format!("tag-{i}").as_str()]))
        .collect()
}

/// `count` records with ids `tag-0`, `tag-1`, ...
pub fn records(count: usize) -> Vec<FlattenedRecord> {
    let envelope = Envelope {
        gateway_id: "aa:bb:cc:dd:ee:ff".into(),
        coordinates: "60.1699,24.9384".into(),
        received_at: "1700000000".into(),
    };

    (0..count)
        .map(|i| {
            let reading = match json!({"temperature": i}) {
                Value::Object(fields) => fields,
                _ => Map::new(),
            };
            FlattenedRecord::new(format!("tag-{i}"), reading, &envelope)
        })
        .collect()
}
