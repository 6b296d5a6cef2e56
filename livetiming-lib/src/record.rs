use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

/// Category reserved for synthesized heartbeat records.
pub const KEEP_ALIVE_CATEGORY: &str = "keep-alive";

/// Message stored on every synthesized heartbeat record.
pub const KEEP_ALIVE_MESSAGE: &str = "Keep alive message: {}";

/// One received live timing event, normalized.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTimingRecord {
    pub timestamp: DateTime<Utc>,
    pub category:  String,
    pub message:   Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
}

impl LiveTimingRecord {
    /// Heartbeat substitute for an empty `{}` event, stamped with `now`
    /// truncated to whole seconds.
    pub fn keep_alive(now: DateTime<Utc>) -> Self {
        let secs = now.timestamp();
        let timestamp = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or(now);
        Self {
            timestamp,
            category:     KEEP_ALIVE_CATEGORY.to_string(),
            message:      Value::String(KEEP_ALIVE_MESSAGE.to_string()),
            is_streaming: Some(false),
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.category == KEEP_ALIVE_CATEGORY
    }
}

/// Converts a fractional epoch-seconds value into a millisecond instant.
///
/// The value is multiplied by 1000 and floored, so anything finer than a
/// millisecond is dropped. Returns `None` for non-finite input or instants
/// chrono cannot represent.
pub fn epoch_seconds_to_instant(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() {
        return None;
    }
    let millis = (raw * 1000.0).floor();
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

/// Inverse of [`epoch_seconds_to_instant`], used when encoding records.
///
/// Encodes the middle of the millisecond so the flooring decode lands on the
/// same millisecond despite float rounding.
pub fn instant_to_epoch_seconds(ts: &DateTime<Utc>) -> f64 {
    (ts.timestamp_millis() as f64 + 0.5) / 1000.0
}
