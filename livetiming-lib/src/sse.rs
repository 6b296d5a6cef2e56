//! Incremental `text/event-stream` decoder.
//!
//! Follows the HTML event-stream interpretation rules: LF, CR and CRLF line
//! endings, an optional leading BOM, `:` comments, and dispatch on an empty
//! line. Incomplete events at end of stream are discarded.

use std::time::Duration;

use bytes::{Buf, BytesMut};

const BOM: &[u8] = b"\xEF\xBB\xBF";
const DEFAULT_EVENT: &str = "message";

/// One dispatched event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data:  String,
    pub id:    String,
    pub retry: Option<Duration>,
}

impl SseEvent {
    /// Unnamed events and events named `message` are plain messages.
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer:   BytesMut,
    started:  bool,
    skip_lf:  bool,
    event:    Option<String>,
    data:     Option<String>,
    last_id:  String,
    retry:    Option<Duration>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk of the body and returns every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        if !self.started {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return Vec::new();
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.advance(BOM.len());
            }
            self.started = true;
        }

        let mut events = Vec::new();
        loop {
            // CRLF split across chunks
            if self.skip_lf {
                match self.buffer.first() {
                    None => break,
                    Some(b'\n') => self.buffer.advance(1),
                    Some(_) => {}
                }
                self.skip_lf = false;
            }

            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') else {
                break;
            };
            let line = self.buffer.split_to(pos);
            if self.buffer[0] == b'\r' {
                self.skip_lf = true;
            }
            self.buffer.advance(1);

            let line = String::from_utf8_lossy(&line);
            if let Some(ev) = self.process_line(&line) {
                events.push(ev);
            }
        }
        events
    }

    /// Last event id seen on the stream.
    pub fn last_event_id(&self) -> &str {
        &self.last_id
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.last_id = value.to_string(),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = self.data.take()?;
        Some(SseEvent {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id:    self.last_id.clone(),
            retry: self.retry.take(),
        })
    }
}
