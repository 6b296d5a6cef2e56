// src/main.rs

use dotenv::dotenv;
use std::error::Error;
use log::{info, error, debug};
use livetiming_lib::Context;
use livetiming_server::{routes, spawn_replay, RelayConfig};

/* RUST_LOG=livetiming_lib=debug,livetiming_server=info \
cargo run -p livetiming-server */

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // ──────── ① Load .env when present ────────
    let dotenv_result = dotenv();

    // initialize logger and panic hook
    env_logger::init();
    std::panic::set_hook(Box::new(|info| {
        error!("Thread panic: {:?}", info);
    }));
    if let Err(e) = dotenv_result {
        debug!("No .env file loaded: {}", e);
    }

    // ──────── ② Read relay settings ────────
    let cfg = RelayConfig::from_env()
        .map_err(|e| format!("Invalid relay configuration: {}", e))?;

    // shared broadcast context carrying encoded SSE payloads
    let ctx: Context<String> = Context::new(cfg.broadcast_capacity);

    // ──────── 1) Optional file replay ────────
    if let Some(path) = cfg.replay_file.clone() {
        info!("Replay: {} every {:?}", path.display(), cfg.replay_interval);
        spawn_replay(path, cfg.replay_interval, ctx.clone());
    }

    // ──────── 2) HTTP (SSE + ingest + health) ────────
    info!("SSE   : {}/api/v1/live (ping every {:?})", cfg.bind, cfg.ping_interval);
    info!("HTTP  : {}/health", cfg.bind);

    warp::serve(routes(ctx, cfg.ping_interval)).run(cfg.bind).await;
    Ok(())
}
