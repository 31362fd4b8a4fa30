//! Raw queue records and the trigger envelope that carries them.
//!
//! The envelope has the queue event shape:
//!
//! ```json
//! {"Records": [{"messageId": "...", "body": "{...}", "attributes": {"SentTimestamp": "1700000000000"}}]}
//! ```

use std::io::Read;

use serde::Deserialize;
use serde_json::Value;
use snafu::prelude::*;

use crate::error::{EnvelopeError, InvalidTimestampSnafu, ParseSnafu, ReadSnafu};

/// One record as received from the queue. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    message_id: Option<String>,
    body: String,
    sent_timestamp: i64,
}

impl RawRecord {
    pub fn new(body: impl Into<String>, sent_timestamp: i64) -> Self {
        Self {
            message_id: None,
            body: body.into(),
            sent_timestamp,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Serialized payload, expected to be a JSON object.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Send time in epoch milliseconds (UTC). Used only for ordering.
    pub fn sent_timestamp(&self) -> i64 {
        self.sent_timestamp
    }
}

#[derive(Debug, Deserialize)]
struct EnvelopeWire {
    #[serde(rename = "Records", default)]
    records: Vec<RecordWire>,
}

#[derive(Debug, Deserialize)]
struct RecordWire {
    #[serde(rename = "messageId", default)]
    message_id: Option<String>,
    body: String,
    #[serde(default)]
    attributes: AttributesWire,
}

#[derive(Debug, Default, Deserialize)]
struct AttributesWire {
    #[serde(rename = "SentTimestamp", default)]
    sent_timestamp: Option<Value>,
}

/// The record set of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordEnvelope {
    records: Vec<RawRecord>,
}

impl RecordEnvelope {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    /// Parse an envelope. A missing `Records` array is an empty record set.
    pub fn from_json(contents: &str) -> Result<Self, EnvelopeError> {
        let wire: EnvelopeWire = serde_json::from_str(contents).context(ParseSnafu)?;
        Self::from_wire(wire)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, EnvelopeError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents).context(ReadSnafu)?;
        Self::from_json(&contents)
    }

    fn from_wire(wire: EnvelopeWire) -> Result<Self, EnvelopeError> {
        let records = wire
            .records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let sent_timestamp = parse_timestamp(index, record.attributes.sent_timestamp)?;
                Ok(RawRecord {
                    message_id: record.message_id,
                    body: record.body,
                    sent_timestamp,
                })
            })
            .collect::<Result<Vec<_>, EnvelopeError>>()?;

        Ok(Self { records })
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `SentTimestamp` is a string-encoded integer; a bare integer is accepted too.
fn parse_timestamp(index: usize, value: Option<Value>) -> Result<i64, EnvelopeError> {
    let parsed = match &value {
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };

    parsed.context(InvalidTimestampSnafu {
        index,
        value: value.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let json = r#"{
            "Records": [
                {"messageId": "m-1", "body": "{\"id\": 1}", "attributes": {"SentTimestamp": "300"}},
                {"body": "{\"id\": 2}", "attributes": {"SentTimestamp": 100}}
            ]
        }"#;

        let envelope = RecordEnvelope::from_json(json).unwrap();
        assert_eq!(envelope.len(), 2);

        let first = &envelope.records()[0];
        assert_eq!(first.message_id(), Some("m-1"));
        assert_eq!(first.body(), r#"{"id": 1}"#);
        assert_eq!(first.sent_timestamp(), 300);

        let second = &envelope.records()[1];
        assert_eq!(second.message_id(), None);
        assert_eq!(second.sent_timestamp(), 100);
    }

    #[test]
    fn test_missing_records_is_empty() {
        let envelope = RecordEnvelope::from_json("{}").unwrap();
        assert!(envelope.is_empty());
    }

    #[test]
    fn test_invalid_timestamp_is_fatal() {
        let json = r#"{"Records": [
            {"body": "{}", "attributes": {"SentTimestamp": "1"}},
            {"body": "{}", "attributes": {"SentTimestamp": "soon"}}
        ]}"#;

        let err = RecordEnvelope::from_json(json).unwrap_err();
        match err {
            EnvelopeError::InvalidTimestamp { index, value } => {
                assert_eq!(index, 1);
                assert_eq!(value.as_deref(), Some("soon"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_timestamp_is_fatal() {
        let json = r#"{"Records": [{"body": "{}"}]}"#;
        let err = RecordEnvelope::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::InvalidTimestamp {
                index: 0,
                value: None
            }
        ));
    }

    #[test]
    fn test_malformed_json() {
        let err = RecordEnvelope::from_json("[not json").unwrap_err();
        assert!(matches!(err, EnvelopeError::Parse { .. }));
    }

    #[test]
    fn test_from_reader() {
        let json = br#"{"Records": [{"body": "{}", "attributes": {"SentTimestamp": "7"}}]}"#;
        let envelope = RecordEnvelope::from_reader(&json[..]).unwrap();
        assert_eq!(envelope.records()[0].sent_timestamp(), 7);
    }
}
