use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::record::LiveTimingRecord;

/// Maximum number of records kept in the history.
pub const MAX_MESSAGES: usize = 20;

/// Connection status. Transport failures collapse into `Disconnected`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamStatus::Disconnected => "disconnected",
            StreamStatus::Connecting   => "connecting",
            StreamStatus::Connected    => "connected",
        };
        f.write_str(s)
    }
}

/// Connection status plus the most recent records, oldest first.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StreamState {
    pub status:   StreamStatus,
    pub messages: VecDeque<LiveTimingRecord>,
}

impl StreamState {
    /// Appends `record`, evicting the oldest entry once the history is full.
    pub fn push(&mut self, record: LiveTimingRecord) {
        if self.messages.len() >= MAX_MESSAGES {
            self.messages.pop_front();
        }
        self.messages.push_back(record);
    }

    pub fn latest(&self) -> Option<&LiveTimingRecord> {
        self.messages.back()
    }
}
