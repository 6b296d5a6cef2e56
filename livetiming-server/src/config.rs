use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("environment variable {0} must be greater than zero")]
    Zero(&'static str),
}

/// Settings for the relay binary.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind:               SocketAddr,
    pub ping_interval:      Duration,
    pub broadcast_capacity: usize,
    pub replay_file:        Option<PathBuf>,
    pub replay_interval:    Duration,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ping_secs: u64 = parse_or(&lookup, "PING_INTERVAL_SECS", 10)?;
        let capacity: usize = parse_or(&lookup, "BROADCAST_CAPACITY", 1024)?;
        let replay_ms: u64 = parse_or(&lookup, "REPLAY_INTERVAL_MS", 300)?;
        if ping_secs == 0 {
            return Err(ConfigError::Zero("PING_INTERVAL_SECS"));
        }
        if capacity == 0 {
            return Err(ConfigError::Zero("BROADCAST_CAPACITY"));
        }

        Ok(Self {
            bind:               parse_or(&lookup, "LIVE_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            ping_interval:      Duration::from_secs(ping_secs),
            broadcast_capacity: capacity,
            replay_file:        lookup("REPLAY_FILE").filter(|p| !p.is_empty()).map(PathBuf::from),
            replay_interval:    Duration::from_millis(replay_ms),
        })
    }
}

/// Settings for the `live-log` viewer.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub url: String,
}

impl ViewerConfig {
    pub const DEFAULT_URL: &'static str = "http://localhost:8080/api/v1/live";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("LIVE_TIMING_URL")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_URL.to_string());
        Self { url }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
