use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use livetiming_lib::record::epoch_seconds_to_instant;
use livetiming_lib::{encode_record, Context, LiveTimingRecord, WireError};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("category must not be empty")]
    EmptyCategory,

    #[error("timestamp {0} is out of range")]
    Timestamp(f64),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A record as accepted by the ingest route and the replay file. The
/// `message` is plain JSON; it is nested as a string when encoded.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub category: String,
    pub message:  Value,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub is_streaming: Option<bool>,
}

impl FeedRecord {
    pub fn into_record(self, now: DateTime<Utc>) -> Result<LiveTimingRecord, FeedError> {
        if self.category.trim().is_empty() {
            return Err(FeedError::EmptyCategory);
        }
        let timestamp = match self.timestamp {
            None => now,
            Some(raw) => epoch_seconds_to_instant(raw).ok_or(FeedError::Timestamp(raw))?,
        };
        Ok(LiveTimingRecord {
            timestamp,
            category:     self.category,
            message:      self.message,
            is_streaming: self.is_streaming,
        })
    }

    /// Converts and encodes into the SSE payload the relay broadcasts.
    pub fn into_payload(self, now: DateTime<Utc>) -> Result<String, FeedError> {
        let record = self.into_record(now)?;
        Ok(encode_record(&record)?)
    }
}

/// Replays a JSON-lines file onto `ctx`, one record per `interval`.
/// Malformed lines are skipped. Returns the number of records published.
pub async fn run_replay(
    path: &Path,
    interval: Duration,
    ctx: Context<String>,
) -> Result<usize, FeedError> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    info!("Replaying live timing records from {}", path.display());

    let mut published = 0;
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let payload = serde_json::from_str::<FeedRecord>(&line)
            .map_err(|e| FeedError::Wire(WireError::Envelope(e)))
            .and_then(|rec| rec.into_payload(Utc::now()));
        match payload {
            Ok(payload) => {
                ctx.publish(payload);
                published += 1;
            }
            Err(e) => {
                warn!("Skipping line {} of {}: {}", line_no, path.display(), e);
                continue;
            }
        }

        tokio::time::sleep(interval).await;
    }

    info!("Replay of {} finished after {} records", path.display(), published);
    Ok(published)
}

/// Spawns [`run_replay`] and logs its outcome.
pub fn spawn_replay(path: std::path::PathBuf, interval: Duration, ctx: Context<String>) {
    tokio::spawn(async move {
        if let Err(e) = run_replay(&path, interval, ctx).await {
            error!("Replay of {} failed: {}", path.display(), e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetiming_lib::decode_event;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn missing_timestamp_defaults_to_now() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_500).unwrap();
        let rec: FeedRecord =
            serde_json::from_value(json!({"category": "WeatherData", "message": {"AirTemp": "21.3"}})).unwrap();
        let rec = rec.into_record(now).unwrap();
        assert_eq!(rec.timestamp, now);
        assert_eq!(rec.message["AirTemp"], "21.3");
    }

    #[test]
    fn payload_decodes_back_on_the_client() {
        let now = Utc::now();
        let rec: FeedRecord = serde_json::from_value(json!({
            "category": "RaceControlMessages",
            "message": {"Message": "GREEN LIGHT - PIT EXIT OPEN"},
            "timestamp": 1700000000.25,
            "isStreaming": true,
        }))
        .unwrap();
        let payload = rec.into_payload(now).unwrap();
        let back = decode_event(&payload, now).unwrap();
        assert_eq!(back.category, "RaceControlMessages");
        assert_eq!(back.timestamp.timestamp_millis(), 1_700_000_000_250);
        assert_eq!(back.is_streaming, Some(true));
    }

    #[test]
    fn empty_category_is_rejected() {
        let rec = FeedRecord { category: " ".into(), message: json!(1), timestamp: None, is_streaming: None };
        assert!(matches!(rec.into_record(Utc::now()), Err(FeedError::EmptyCategory)));
    }

    #[tokio::test]
    async fn replay_publishes_valid_lines_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"category":"LapCount","message":{{"CurrentLap":1}},"timestamp":1700000000}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"category":"LapCount","message":{{"CurrentLap":2}},"timestamp":1700000001}}"#).unwrap();
        file.flush().unwrap();

        let ctx = Context::new(16);
        let mut rx = ctx.subscribe();
        let published = run_replay(file.path(), Duration::from_millis(1), ctx).await.unwrap();
        assert_eq!(published, 2);

        let now = Utc::now();
        let first = decode_event(&rx.recv().await.unwrap(), now).unwrap();
        let second = decode_event(&rx.recv().await.unwrap(), now).unwrap();
        assert_eq!(first.message["CurrentLap"], 1);
        assert_eq!(second.message["CurrentLap"], 2);
    }

    #[tokio::test]
    async fn replay_of_missing_file_fails() {
        let ctx = Context::new(1);
        let err = run_replay(Path::new("/nonexistent/race.jsonl"), Duration::ZERO, ctx).await.unwrap_err();
        assert!(matches!(err, FeedError::Io(_)));
    }
}
