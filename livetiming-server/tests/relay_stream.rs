use std::time::Duration;

use chrono::Utc;
use livetiming_lib::{Context, LiveStreamClient, StreamStatus};
use livetiming_server::{routes, FeedRecord};
use serde_json::json;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn start_relay(ping: Duration) -> (String, Context<String>) {
    let ctx: Context<String> = Context::new(16);
    let (addr, server) = warp::serve(routes(ctx.clone(), ping)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (format!("http://{}/api/v1/live", addr), ctx)
}

#[tokio::test]
async fn client_receives_records_and_pings_through_the_relay() {
    let (url, ctx) = start_relay(Duration::from_millis(200));

    let client = LiveStreamClient::sse();
    let mut state = client.connect(&url);
    assert!(timeout(WAIT, state.wait_for_status(StreamStatus::Connected)).await.unwrap());
    let mut records = client.records();

    let record: FeedRecord = serde_json::from_value(json!({
        "category": "SessionStatus",
        "message": {"Status": "Started"},
        "timestamp": 1700000000.123456,
        "isStreaming": true,
    }))
    .unwrap();
    ctx.publish(record.into_payload(Utc::now()).unwrap());

    let mut saw_record = false;
    let mut saw_ping = false;
    while !(saw_record && saw_ping) {
        let rec = timeout(WAIT, records.recv()).await.unwrap().unwrap();
        if rec.is_keep_alive() {
            saw_ping = true;
        } else {
            assert_eq!(rec.category, "SessionStatus");
            assert_eq!(rec.message["Status"], "Started");
            assert_eq!(rec.timestamp.timestamp_millis(), 1_700_000_000_123);
            saw_record = true;
        }
    }

    client.disconnect();
    assert_eq!(state.status(), StreamStatus::Disconnected);
}

#[tokio::test]
async fn unknown_path_ends_disconnected() {
    let (url, _ctx) = start_relay(Duration::from_secs(10));

    let client = LiveStreamClient::sse();
    let mut state = client.connect(&url.replace("/live", "/missing"));
    assert!(timeout(WAIT, state.wait_for_status(StreamStatus::Disconnected)).await.unwrap());
    assert!(state.messages().is_empty());
}
