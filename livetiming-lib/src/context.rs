use tokio::sync::broadcast;

/// A small wrapper around a Tokio broadcast channel,
/// used to fan out live timing records (or their wire payloads).
#[derive(Clone)]
pub struct Context<T: Clone> {
    pub tx: broadcast::Sender<T>,
}

impl<T: Clone> Context<T> {
    /// Create a new Context with a channel of the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// Publishes `item`, returning how many receivers saw it. Having no
    /// receivers is not an error.
    pub fn publish(&self, item: T) -> usize {
        self.tx.send(item).unwrap_or(0)
    }
}
