use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use chrono::Utc;
use futures_util::Stream;
use livetiming_lib::wire::heartbeat;
use livetiming_lib::Context;
use log::{info, warn};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant};
use warp::http::StatusCode;
use warp::sse::Event;
use warp::{Filter, Rejection, Reply};

use crate::feed::FeedRecord;

/// Cloneable filter handing the broadcast context to handlers
fn with_ctx(
    ctx: Context<String>,
) -> impl Filter<Extract = (Context<String>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// All relay routes: `GET|POST /api/v1/live` and `GET /health`.
pub fn routes(
    ctx: Context<String>,
    ping_interval: Duration,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    // GET /api/v1/live → SSE
    let stream_route = warp::get()
        .and(warp::path!("api" / "v1" / "live"))
        .and(with_ctx(ctx.clone()))
        .map(move |ctx: Context<String>| {
            // subscribe before replying so nothing published after the
            // client sees the response is missed
            let rx = ctx.subscribe();
            info!("SSE client subscribed ({} active)", ctx.tx.receiver_count());
            let reply = warp::sse::reply(live_events(rx, ping_interval));
            warp::reply::with_header(reply, "x-accel-buffering", "no")
        });

    // POST /api/v1/live
    let ingest_route = warp::post()
        .and(warp::path!("api" / "v1" / "live"))
        .and(warp::body::content_length_limit(1024 * 1024))
        .and(warp::body::json::<FeedRecord>())
        .and(with_ctx(ctx))
        .map(ingest);

    let health = warp::get().and(warp::path!("health")).map(|| "OK");

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["OPTIONS", "GET", "POST"])
        .allow_headers(vec!["content-type", "accept", "last-event-id", "origin", "cache-control"]);

    stream_route.or(ingest_route).or(health).with(cors)
}

fn ingest(record: FeedRecord, ctx: Context<String>) -> warp::reply::Response {
    let category = record.category.clone();
    match record.into_payload(Utc::now()) {
        Ok(payload) => {
            let receivers = ctx.publish(payload);
            info!("Ingested '{}' record for {} subscriber(s)", category, receivers);
            warp::reply::with_status(warp::reply::json(&json!({ "receivers": receivers })), StatusCode::ACCEPTED)
                .into_response()
        }
        Err(e) => {
            warn!("Rejected '{}' record: {}", category, e);
            warp::reply::with_status(warp::reply::json(&json!({ "error": e.to_string() })), StatusCode::BAD_REQUEST)
                .into_response()
        }
    }
}

/// Broadcast payloads merged with a `{}` ping every `ping_interval`.
fn live_events(
    mut rx: broadcast::Receiver<String>,
    ping_interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        loop {
            let payload = tokio::select! {
                _ = ping.tick() => heartbeat(),
                msg = rx.recv() => match msg {
                    Ok(payload) => payload,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE client lagged, dropped {} messages", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            yield Ok::<_, Infallible>(Event::default().data(payload));
        }
    }
}
