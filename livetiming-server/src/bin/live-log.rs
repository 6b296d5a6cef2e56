// src/bin/live-log.rs

use dotenv::dotenv;
use std::error::Error;
use log::{info, error, debug};
use livetiming_lib::{LiveStreamClient, LiveTimingRecord, StreamStatus};
use livetiming_server::ViewerConfig;

/* RUST_LOG=livetiming_lib=info,live_log=info \
LIVE_TIMING_URL=http://localhost:8080/api/v1/live cargo run -p livetiming-server --bin live-log */

/// One scrolling log line per record.
fn render(record: &LiveTimingRecord) -> String {
    let message = match &record.message {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("{} [{}] {}", record.timestamp.format("%H:%M:%S%.3f"), record.category, message)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let dotenv_result = dotenv();
    env_logger::init();
    std::panic::set_hook(Box::new(|info| {
        error!("Thread panic: {:?}", info);
    }));
    if let Err(e) = dotenv_result {
        debug!("No .env file loaded: {}", e);
    }

    let cfg = ViewerConfig::from_env();
    let client = LiveStreamClient::sse();
    let _printer = client.subscribe(|record| println!("{}", render(record)));

    let mut state = client.connect(&cfg.url);
    let mut status = state.status();
    info!("Status: {} ({})", status, cfg.url);

    loop {
        tokio::select! {
            changed = state.changed() => {
                let Some(snapshot) = changed else { break };
                debug!("{} record(s) buffered", snapshot.messages.len());
                if snapshot.status == status {
                    continue;
                }
                status = snapshot.status;
                info!("Status: {}", status);
                if status == StreamStatus::Disconnected {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, disconnecting");
                client.disconnect();
                break;
            }
        }
    }
    Ok(())
}
