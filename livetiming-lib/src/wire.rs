//! Two-stage decoding of stream event payloads.
//!
//! The outer envelope is a JSON object. An empty object is a heartbeat,
//! anything else must carry `category`, `message` and `timestamp`. The
//! `message` field is itself a JSON-encoded string that gets decoded again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{epoch_seconds_to_instant, instant_to_epoch_seconds, LiveTimingRecord};

/// Errors returned while decoding a single event payload.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed message payload in category '{category}': {source}")]
    Payload {
        category: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("timestamp {0} cannot be represented as an instant")]
    Timestamp(f64),

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Envelope as it travels on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    pub category:  String,
    pub message:   Value,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
}

impl WireRecord {
    /// Builds the envelope for `record`, nesting the payload as a JSON string.
    pub fn from_record(record: &LiveTimingRecord) -> Result<Self, WireError> {
        let message = serde_json::to_string(&record.message).map_err(WireError::Encode)?;
        Ok(Self {
            category:     record.category.clone(),
            message:      Value::String(message),
            timestamp:    instant_to_epoch_seconds(&record.timestamp),
            is_streaming: record.is_streaming,
        })
    }

    /// Serializes into the text carried by one SSE `data:` field.
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    /// Second stage: recovers the structured payload and the instant.
    pub fn into_record(self) -> Result<LiveTimingRecord, WireError> {
        let timestamp =
            epoch_seconds_to_instant(self.timestamp).ok_or(WireError::Timestamp(self.timestamp))?;
        let message = match self.message {
            Value::String(inner) => match serde_json::from_str(&inner) {
                Ok(v) => v,
                Err(source) => {
                    return Err(WireError::Payload { category: self.category, source });
                }
            },
            // earlier revision: payload sent inline
            other => other,
        };
        Ok(LiveTimingRecord {
            timestamp,
            category: self.category,
            message,
            is_streaming: self.is_streaming,
        })
    }
}

/// Decodes one event's data into a record. `now` stamps heartbeats.
pub fn decode_event(data: &str, now: DateTime<Utc>) -> Result<LiveTimingRecord, WireError> {
    let outer: Value = serde_json::from_str(data).map_err(WireError::Envelope)?;
    if is_empty_object(&outer) {
        return Ok(LiveTimingRecord::keep_alive(now));
    }
    let envelope: WireRecord = serde_json::from_value(outer).map_err(WireError::Envelope)?;
    envelope.into_record()
}

/// Encodes a record into SSE data text.
pub fn encode_record(record: &LiveTimingRecord) -> Result<String, WireError> {
    WireRecord::from_record(record)?.encode()
}

/// The heartbeat payload a server pushes to keep the stream open.
pub fn heartbeat() -> String {
    Value::Object(Map::new()).to_string()
}

fn is_empty_object(v: &Value) -> bool {
    matches!(v, Value::Object(map) if map.is_empty())
}
