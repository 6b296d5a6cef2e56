//! Push-stream transports.
//!
//! A [`Transport`] opens one connection per call. Each connection yields
//! [`TransportEvent`]s in arrival order and is closed through its [`Closer`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use log::{debug, info};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::sse::EventDecoder;

/// What a connection reports back to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status {0}")]
    Status(reqwest::StatusCode),

    #[error("stream ended by server")]
    Ended,
}

/// Closes a connection once, either explicitly or on drop.
pub struct Closer(Option<Box<dyn FnOnce() + Send>>);

impl Closer {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(f)))
    }

    pub fn close(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.close();
    }
}

/// One open (or opening) stream.
pub struct Connection {
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub closer: Closer,
}

pub trait Transport: Send + Sync + 'static {
    /// Starts connecting to `url`. Must be called from within a tokio runtime.
    fn open(&self, url: &str) -> Connection;
}

/// Server-sent-events over HTTP.
#[derive(Clone, Default)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for SseTransport {
    fn open(&self, url: &str) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_stream(self.client.clone(), url.to_string(), tx));
        let abort = task.abort_handle();
        Connection {
            events: rx,
            closer: Closer::new(move || abort.abort()),
        }
    }
}

async fn run_stream(client: reqwest::Client, url: String, tx: mpsc::UnboundedSender<TransportEvent>) {
    let err = match stream_events(&client, &url, &tx).await {
        Ok(()) => return,
        Err(e) => e,
    };
    info!("SSE stream {} closed: {}", url, err);
    let _ = tx.send(TransportEvent::Error(err.to_string()));
}

/// Returns `Ok` only when the receiving side went away.
async fn stream_events(
    client: &reqwest::Client,
    url: &str,
    tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<(), TransportError> {
    let resp = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(TransportError::Status(status));
    }
    if tx.send(TransportEvent::Open).is_err() {
        return Ok(());
    }

    let mut body = resp.bytes_stream();
    let mut decoder = EventDecoder::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for ev in decoder.feed(&chunk) {
            if !ev.is_message() {
                debug!("Ignoring '{}' event from {}", ev.event, url);
                continue;
            }
            if tx.send(TransportEvent::Message(ev.data)).is_err() {
                return Ok(());
            }
        }
    }
    Err(TransportError::Ended)
}

/// In-memory transport driven by the caller, one [`ChannelPeer`] per `open`.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    peers: Arc<Mutex<Vec<ChannelPeer>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection opened so far, oldest first.
    pub fn peers(&self) -> Vec<ChannelPeer> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<ChannelPeer> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    /// Number of connections not closed yet.
    pub fn open_count(&self) -> usize {
        self.peers().iter().filter(|p| !p.is_closed()).count()
    }
}

impl Transport for ChannelTransport {
    fn open(&self, url: &str) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let peer = ChannelPeer { url: url.to_string(), tx, closed: closed.clone() };
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).push(peer);
        Connection {
            events: rx,
            closer: Closer::new(move || closed.store(true, Ordering::SeqCst)),
        }
    }
}

/// Server side of a [`ChannelTransport`] connection.
#[derive(Clone)]
pub struct ChannelPeer {
    url:    String,
    tx:     mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl ChannelPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> bool {
        self.send(TransportEvent::Open)
    }

    pub fn message(&self, data: impl Into<String>) -> bool {
        self.send(TransportEvent::Message(data.into()))
    }

    pub fn error(&self, reason: impl Into<String>) -> bool {
        self.send(TransportEvent::Error(reason.into()))
    }

    fn send(&self, ev: TransportEvent) -> bool {
        !self.is_closed() && self.tx.send(ev).is_ok()
    }
}
