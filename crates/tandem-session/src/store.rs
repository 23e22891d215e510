//! The durable, ordered event log as seen by one node.
//!
//! A [`DurableStore`] accepts appends and pushes the complete ordered
//! stream to every subscriber whenever it changes. [`MemoryStore`] is the
//! in-process implementation used for local pairing and tests; both peers
//! share one instance (clones share state).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tandem_core::{SystemWallClock, WallClock};
use tandem_types::Event;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use crate::error::StoreError;

/// A full ordered copy of the stream.
pub type Snapshot = Arc<[Event]>;

/// Append-only event log with snapshot subscriptions.
pub trait DurableStore: Send + Sync + 'static {
    /// Append one event.
    ///
    /// Appending an event whose timestamp is already stored is a no-op.
    fn append(&self, event: &Event) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Subscribe to snapshots. The current snapshot is delivered first.
    /// Dropping the subscription unsubscribes.
    fn subscribe(&self) -> Result<SnapshotSubscription, StoreError>;
}

/// A live feed of snapshots.
#[derive(Debug)]
pub struct SnapshotSubscription {
    receiver: watch::Receiver<Snapshot>,
}

impl SnapshotSubscription {
    /// Wrap a receiver so the value it currently holds is yielded first.
    pub fn new(mut receiver: watch::Receiver<Snapshot>) -> Self {
        receiver.mark_changed();
        Self { receiver }
    }

    /// Wait for the next snapshot. `None` once the store is gone.
    ///
    /// Intermediate snapshots may be skipped; each one is complete, so
    /// only the latest matters.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        Some(Arc::clone(&self.receiver.borrow_and_update()))
    }
}

#[derive(Debug)]
struct MemoryInner {
    events: Mutex<Vec<Event>>,
    snapshots: watch::Sender<Snapshot>,
    available: AtomicBool,
}

/// In-memory [`DurableStore`].
///
/// Events are kept sorted by timestamp regardless of append order and are
/// stamped with a `server_arrival` time on the way in.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// An empty, available store.
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Snapshot::from(Vec::new()));
        Self {
            inner: Arc::new(MemoryInner {
                events: Mutex::new(Vec::new()),
                snapshots,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Switch the store on or off. While off, appends and new
    /// subscriptions fail with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Whether the store currently accepts requests.
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// A copy of the stored stream.
    pub async fn events(&self) -> Vec<Event> {
        self.inner.events.lock().await.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.snapshots.receiver_count()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                reason: String::from("memory store switched off"),
            })
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for MemoryStore {
    async fn append(&self, event: &Event) -> Result<(), StoreError> {
        if let Err(error) = self.check_available() {
            warn!(timestamp = %event.timestamp(), %error, "append refused");
            return Err(error);
        }

        let mut events = self.inner.events.lock().await;
        if events.iter().any(|e| e.timestamp() == event.timestamp()) {
            debug!(timestamp = %event.timestamp(), "duplicate append ignored");
            return Ok(());
        }

        let stamped = event
            .clone()
            .with_server_arrival(SystemWallClock.now_millis());
        let position = events.partition_point(|e| e.timestamp() < stamped.timestamp());
        events.insert(position, stamped);

        let snapshot = Snapshot::from(events.as_slice());
        drop(events);
        let len = snapshot.len();
        self.inner.snapshots.send_replace(snapshot);
        debug!(
            timestamp = %event.timestamp(),
            origin = %event.origin(),
            kind = %event.kind(),
            len,
            "event appended"
        );
        Ok(())
    }

    fn subscribe(&self) -> Result<SnapshotSubscription, StoreError> {
        self.check_available()?;
        Ok(SnapshotSubscription::new(self.inner.snapshots.subscribe()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tandem_types::{HybridTimestamp, NodeId, Payload};

    use super::*;

    fn chat(text: &str, physical: u64, node: &str) -> Event {
        let node = NodeId::new(node).unwrap();
        Event::new(
            Payload::chat(text),
            HybridTimestamp::new(physical, 0, node),
        )
        .unwrap()
    }

    fn texts(snapshot: &[Event]) -> Vec<String> {
        snapshot
            .iter()
            .filter_map(|e| match e.payload() {
                Payload::Chat { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn subscription_starts_with_current_snapshot() {
        let store = MemoryStore::new();
        store.append(&chat("first", 1, "a")).await.unwrap();
        let mut sub = store.subscribe().unwrap();
        let snapshot = sub.next().await.unwrap();
        assert_eq!(texts(&snapshot), ["first"]);
    }

    #[tokio::test]
    async fn out_of_order_appends_are_kept_sorted() {
        let store = MemoryStore::new();
        store.append(&chat("late", 30, "a")).await.unwrap();
        store.append(&chat("early", 10, "b")).await.unwrap();
        store.append(&chat("middle", 20, "a")).await.unwrap();
        let events = store.events().await;
        assert_eq!(texts(&events), ["early", "middle", "late"]);
        assert!(events.iter().all(|e| e.server_arrival().is_some()));
    }

    #[tokio::test]
    async fn duplicate_timestamp_is_ignored() {
        let store = MemoryStore::new();
        let event = chat("once", 5, "a");
        store.append(&event).await.unwrap();
        store.append(&event).await.unwrap();
        assert_eq!(store.events().await.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_refuses_appends_and_subscriptions() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.append(&chat("x", 1, "a")).await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.subscribe().is_err());
        assert!(store.events().await.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_each_change_and_unsubscribe_on_drop() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe().unwrap();
        assert!(sub.next().await.unwrap().is_empty());
        assert_eq!(store.subscriber_count(), 1);

        store.append(&chat("hello", 1, "a")).await.unwrap();
        assert_eq!(texts(&sub.next().await.unwrap()), ["hello"]);

        drop(sub);
        assert_eq!(store.subscriber_count(), 0);
    }
}
