//! livetiming-lib: live timing stream client, record decoding, and fan-out

pub mod client;
pub mod context;
pub mod listeners;
pub mod record;
pub mod sse;
pub mod store;
pub mod transport;
pub mod wire;

// re-exports for ergonomic imports:
pub use client::{LiveStreamClient, StreamHandle};
pub use context::Context;
pub use listeners::{ListenerRegistry, Subscription};
pub use record::LiveTimingRecord;
pub use store::{StreamState, StreamStatus, MAX_MESSAGES};
pub use transport::{ChannelTransport, SseTransport, Transport, TransportEvent};
pub use wire::{decode_event, encode_record, WireError, WireRecord};
