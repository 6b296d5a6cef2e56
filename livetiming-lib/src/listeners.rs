use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::{debug, error};

use crate::record::LiveTimingRecord;

type Listener = Arc<dyn Fn(&LiveTimingRecord) + Send + Sync>;

#[derive(Default)]
struct Inner {
    next_id:   u64,
    listeners: Vec<(u64, Listener)>,
}

/// Ordered set of record callbacks.
///
/// Listeners run synchronously in registration order. A panicking listener
/// is logged and skipped so the rest still see the record.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LiveTimingRecord) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        debug!("Added record listener #{}", id);
        Subscription { id, registry: Arc::downgrade(&self.inner) }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every listener with `record`. Returns how many of them panicked.
    pub fn notify(&self, record: &LiveTimingRecord) -> usize {
        // snapshot so listeners may subscribe/unsubscribe while being called
        let listeners: Vec<(u64, Listener)> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .clone();

        let mut failed = 0;
        for (id, listener) in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(record))).is_err() {
                error!("Record listener #{} panicked on category '{}'", id, record.category);
                failed += 1;
            }
        }
        failed
    }
}

/// Disposer handle returned by [`ListenerRegistry::subscribe`].
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    id:       u64,
    registry: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the listener now.
    pub fn unsubscribe(self) {}

    /// Keeps the listener registered for the lifetime of the registry.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|(id, _)| *id != self.id);
            debug!("Removed record listener #{}", self.id);
        }
    }
}
