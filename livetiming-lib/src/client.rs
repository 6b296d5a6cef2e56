use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;

use crate::context::Context;
use crate::listeners::{ListenerRegistry, Subscription};
use crate::record::LiveTimingRecord;
use crate::store::{StreamState, StreamStatus};
use crate::transport::{Closer, Connection, SseTransport, Transport, TransportEvent};
use crate::wire::decode_event;

/// Capacity of the async record channel returned by [`LiveStreamClient::records`].
pub const DEFAULT_RECORD_CAPACITY: usize = 1024;

/// Owns at most one live stream and the shared [`StreamState`].
///
/// `connect` replaces any open stream, transport errors drop the state back to
/// `Disconnected` without retrying. All events of a connection are applied by
/// a single task, in arrival order.
pub struct LiveStreamClient<T: Transport = SseTransport> {
    transport: T,
    shared:    Arc<Shared>,
}

struct Shared {
    state:     watch::Sender<StreamState>,
    slot:      Mutex<Slot>,
    listeners: ListenerRegistry,
    records:   Context<LiveTimingRecord>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    active:     Option<Active>,
}

struct Active {
    generation: u64,
    url:        String,
    closer:     Closer,
    pump:       AbortHandle,
}

impl Active {
    fn shutdown(mut self) {
        self.closer.close();
        self.pump.abort();
    }
}

impl LiveStreamClient<SseTransport> {
    pub fn sse() -> Self {
        Self::new(SseTransport::new())
    }
}

impl<T: Transport> LiveStreamClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_record_capacity(transport, DEFAULT_RECORD_CAPACITY)
    }

    pub fn with_record_capacity(transport: T, capacity: usize) -> Self {
        let (state, _) = watch::channel(StreamState::default());
        Self {
            transport,
            shared: Arc::new(Shared {
                state,
                slot:      Mutex::new(Slot::default()),
                listeners: ListenerRegistry::new(),
                records:   Context::new(capacity),
            }),
        }
    }

    /// Registers a listener called for every record after it is stored.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LiveTimingRecord) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(listener)
    }

    /// Async feed of every stored record.
    pub fn records(&self) -> broadcast::Receiver<LiveTimingRecord> {
        self.shared.records.subscribe()
    }

    /// Handle observing the shared state.
    pub fn state(&self) -> StreamHandle {
        StreamHandle { rx: self.shared.state.subscribe() }
    }

    /// URL of the current connection, if any.
    pub fn url(&self) -> Option<String> {
        self.shared.lock_slot().active.as_ref().map(|a| a.url.clone())
    }

    /// Opens a stream to `url`, closing the previous one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, url: &str) -> StreamHandle {
        let mut slot = self.shared.lock_slot();
        if let Some(prev) = slot.active.take() {
            info!("Closing stream {} before connecting to {}", prev.url, url);
            prev.shutdown();
        }

        slot.generation += 1;
        let generation = slot.generation;
        self.shared.set_status(StreamStatus::Connecting);

        let Connection { events, closer } = self.transport.open(url);
        let pump = tokio::spawn(pump(self.shared.clone(), generation, events));
        slot.active = Some(Active {
            generation,
            url: url.to_string(),
            closer,
            pump: pump.abort_handle(),
        });
        info!("Connecting to live timing stream {}", url);
        drop(slot);

        self.state()
    }

    /// Closes the current stream, if any. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.shared.shutdown();
    }
}

impl<T: Transport> Drop for LiveStreamClient<T> {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: StreamStatus) {
        let changed = self.state.send_if_modified(|s| {
            let changed = s.status != status;
            s.status = status;
            changed
        });
        if changed {
            debug!("Stream status -> {}", status);
        }
    }

    fn shutdown(&self) {
        let mut slot = self.lock_slot();
        if let Some(active) = slot.active.take() {
            info!("Disconnecting from {}", active.url);
            active.shutdown();
        }
        self.set_status(StreamStatus::Disconnected);
    }

    /// Applies one transport event. Returns `false` once the connection is
    /// finished or has been replaced.
    fn apply(&self, generation: u64, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Open => {
                let slot = self.lock_slot();
                if !is_current(&slot, generation) {
                    return false;
                }
                self.set_status(StreamStatus::Connected);
                if let Some(active) = &slot.active {
                    info!("Connected to live timing stream {}", active.url);
                }
                true
            }
            TransportEvent::Message(data) => {
                let record = {
                    let slot = self.lock_slot();
                    if !is_current(&slot, generation) {
                        return false;
                    }
                    match decode_event(&data, Utc::now()) {
                        Ok(record) => {
                            self.state.send_modify(|s| s.push(record.clone()));
                            record
                        }
                        Err(e) => {
                            warn!("Dropping live timing event: {}", e);
                            return true;
                        }
                    }
                };
                self.listeners.notify(&record);
                self.records.publish(record);
                true
            }
            TransportEvent::Error(reason) => {
                self.fail(generation, &reason);
                false
            }
        }
    }

    fn fail(&self, generation: u64, reason: &str) {
        let mut slot = self.lock_slot();
        if !is_current(&slot, generation) {
            return;
        }
        if let Some(mut active) = slot.active.take() {
            warn!("Live timing stream {} failed: {}", active.url, reason);
            // the pump is the caller, so only the transport is closed here
            active.closer.close();
        }
        self.set_status(StreamStatus::Disconnected);
    }
}

fn is_current(slot: &Slot, generation: u64) -> bool {
    slot.active.as_ref().is_some_and(|a| a.generation == generation)
}

async fn pump(shared: Arc<Shared>, generation: u64, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        if !shared.apply(generation, event) {
            return;
        }
    }
    shared.fail(generation, "transport went away");
}

/// Read side of the shared [`StreamState`].
#[derive(Clone)]
pub struct StreamHandle {
    rx: watch::Receiver<StreamState>,
}

impl StreamHandle {
    pub fn status(&self) -> StreamStatus {
        self.rx.borrow().status
    }

    pub fn snapshot(&self) -> StreamState {
        self.rx.borrow().clone()
    }

    pub fn messages(&self) -> Vec<LiveTimingRecord> {
        self.rx.borrow().messages.iter().cloned().collect()
    }

    /// Waits for the next change and returns the new state. `None` once the
    /// client is gone.
    pub async fn changed(&mut self) -> Option<StreamState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until the status equals `status`. `false` if the client is gone.
    pub async fn wait_for_status(&mut self, status: StreamStatus) -> bool {
        self.rx.wait_for(|s| s.status == status).await.is_ok()
    }

    /// Waits until at least `n` records are stored.
    pub async fn wait_for_messages(&mut self, n: usize) -> bool {
        self.rx.wait_for(|s| s.messages.len() >= n).await.is_ok()
    }
}
