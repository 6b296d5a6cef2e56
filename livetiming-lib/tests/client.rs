use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use livetiming_lib::{ChannelTransport, LiveStreamClient, StreamStatus, MAX_MESSAGES};
use serde_json::json;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn car_data(lap: usize) -> String {
    let inner = json!({ "Lap": lap }).to_string();
    json!({
        "category": "TimingData",
        "message": inner,
        "timestamp": 1_700_000_000.0 + lap as f64,
        "isStreaming": true,
    })
    .to_string()
}

fn connected() -> (ChannelTransport, LiveStreamClient<ChannelTransport>) {
    let transport = ChannelTransport::new();
    let client = LiveStreamClient::new(transport.clone());
    client.connect("mem://live");
    transport.last().unwrap().open();
    (transport, client)
}

#[tokio::test]
async fn history_keeps_latest_twenty_in_arrival_order() {
    let (transport, client) = connected();
    let peer = transport.last().unwrap();
    for lap in 0..25 {
        peer.message(car_data(lap));
    }

    let mut state = client.state();
    let mut records = client.records();
    for _ in 0..25 {
        timeout(WAIT, records.recv()).await.unwrap().unwrap();
    }
    assert!(timeout(WAIT, state.wait_for_status(StreamStatus::Connected)).await.unwrap());

    let laps: Vec<_> = state.messages().iter().map(|r| r.message["Lap"].as_u64().unwrap()).collect();
    assert_eq!(laps.len(), MAX_MESSAGES);
    assert_eq!(laps, (5..25).collect::<Vec<u64>>());
}

#[tokio::test]
async fn connect_replaces_the_previous_stream() {
    let (transport, client) = connected();
    let first = transport.last().unwrap();

    let mut state = client.connect("mem://other");
    assert_eq!(state.status(), StreamStatus::Connecting);
    assert!(first.is_closed());
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.url().as_deref(), Some("mem://other"));

    let second = transport.last().unwrap();
    assert_eq!(second.url(), "mem://other");
    second.open();
    assert!(timeout(WAIT, state.wait_for_status(StreamStatus::Connected)).await.unwrap());
}

#[tokio::test]
async fn events_from_a_replaced_stream_are_ignored() {
    let transport = ChannelTransport::new();
    let client = LiveStreamClient::new(transport.clone());

    client.connect("mem://a");
    let old = transport.last().unwrap();
    let mut state = client.connect("mem://b");
    assert!(!old.message(car_data(1)));
    assert!(!old.error("late failure"));

    let new = transport.last().unwrap();
    new.open();
    new.message(car_data(2));
    assert!(timeout(WAIT, state.wait_for_messages(1)).await.unwrap());
    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, StreamStatus::Connected);
    assert_eq!(snapshot.messages[0].message["Lap"], 2);
}

#[tokio::test]
async fn listeners_see_each_record_in_registration_order() {
    let (transport, client) = connected();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let (c1, c2) = (calls.clone(), calls.clone());
    let _l1 = client.subscribe(move |r| c1.lock().unwrap().push(("L1", r.message["Lap"].as_u64())));
    let _l2 = client.subscribe(move |r| c2.lock().unwrap().push(("L2", r.message["Lap"].as_u64())));

    let mut records = client.records();
    let peer = transport.last().unwrap();
    peer.message(car_data(1));
    peer.message(car_data(2));
    for _ in 0..2 {
        timeout(WAIT, records.recv()).await.unwrap().unwrap();
    }

    assert_eq!(
        *calls.lock().unwrap(),
        vec![("L1", Some(1)), ("L2", Some(1)), ("L1", Some(2)), ("L2", Some(2))]
    );
}

#[tokio::test]
async fn listener_sees_record_already_stored() {
    let (transport, client) = connected();
    let handle = client.state();
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    let _sub = client.subscribe(move |r| {
        let stored = handle.messages().last().map(|last| last == r);
        *s.lock().unwrap() = stored;
    });

    let mut records = client.records();
    transport.last().unwrap().message(car_data(3));
    timeout(WAIT, records.recv()).await.unwrap().unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn heartbeat_is_stored_as_keep_alive_near_now() {
    let (transport, client) = connected();
    let mut records = client.records();
    transport.last().unwrap().message("{}");

    let rec = timeout(WAIT, records.recv()).await.unwrap().unwrap();
    assert_eq!(rec.category, "keep-alive");
    assert_eq!(rec.is_streaming, Some(false));
    let drift = (Utc::now() - rec.timestamp).num_milliseconds().abs();
    assert!(drift < 5_000, "keep-alive drifted {drift} ms");
}

#[tokio::test]
async fn error_leaves_history_and_requires_reconnect() {
    let (transport, client) = connected();
    let peer = transport.last().unwrap();
    let mut state = client.state();
    peer.message(car_data(1));
    assert!(timeout(WAIT, state.wait_for_messages(1)).await.unwrap());

    peer.error("server closed");
    assert!(timeout(WAIT, state.wait_for_status(StreamStatus::Disconnected)).await.unwrap());
    assert_eq!(state.messages().len(), 1);
    assert_eq!(transport.peers().len(), 1);

    client.connect("mem://live");
    assert_eq!(transport.peers().len(), 2);
    assert_eq!(state.status(), StreamStatus::Connecting);
}
