//! livetiming-server: SSE relay for live timing records and the terminal viewer

pub mod config;
pub mod feed;
pub mod relay;

pub use config::{ConfigError, RelayConfig, ViewerConfig};
pub use feed::{run_replay, spawn_replay, FeedError, FeedRecord};
pub use relay::routes;
