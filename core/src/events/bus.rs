//! In-memory pub/sub with bounded history and drop-on-slow-consumer fan-out.

use std::collections::{HashSet, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{Event, EventKind};

/// Capacity of each subscriber channel. A subscriber that falls this many
/// events behind starts losing events; the publisher never waits.
pub const SUBSCRIBER_CAPACITY: usize = 64;

/// Default bound on retained history before the oldest entries are evicted.
const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Capability interface for components that emit pipeline events without
/// depending on the bus directly.
pub trait EventPublisher: Send + Sync {
    fn publish_event(
        &self,
        kind: EventKind,
        data: Value,
        step_index: Option<usize>,
        duration: Option<Duration>,
    );
}

struct Subscriber {
    id: u64,
    filter: Option<HashSet<EventKind>>,
    tx: mpsc::Sender<Event>,
}

struct BusInner {
    subscribers: Vec<Subscriber>,
    history: VecDeque<Event>,
    capacity: usize,
    next_id: u64,
}

/// A live subscription handle. Dropping it (or the receiver) detaches the
/// subscriber; the bus prunes the slot on the next publish.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Receive the next event, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Consume the subscription, yielding the raw receiver (used by the
    /// inspector to adapt the subscription into a stream).
    pub fn into_receiver(self) -> mpsc::Receiver<Event> {
        self.rx
    }
}

/// In-memory event bus. All operations are safe for concurrent use; `publish`
/// never blocks on subscribers.
pub struct MemoryBus {
    inner: RwLock<BusInner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a bus retaining at most `capacity` events of history.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(BusInner {
                subscribers: Vec::new(),
                history: VecDeque::with_capacity(capacity.min(256)),
                capacity: capacity.max(1),
                next_id: 0,
            }),
        }
    }

    /// Publish an event to history and to every matching subscriber.
    ///
    /// Events without a timestamp are stamped here. A subscriber whose
    /// channel is full loses the event; the publisher and every other
    /// subscriber proceed unaffected.
    pub fn publish(&self, mut event: Event) {
        if event.is_unstamped() {
            event.timestamp = Utc::now();
        }

        let mut inner = self.inner.write().expect("event bus lock poisoned");
        if inner.history.len() == inner.capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());

        inner.subscribers.retain(|sub| {
            if let Some(filter) = &sub.filter
                && !filter.contains(&event.kind)
            {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Subscribe to events, optionally filtered to a set of kinds. An empty
    /// filter slice means all events.
    pub fn subscribe(&self, filter: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut inner = self.inner.write().expect("event bus lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            filter: if filter.is_empty() {
                None
            } else {
                Some(filter.iter().copied().collect())
            },
            tx,
        });
        Subscription { id, rx }
    }

    /// Remove a subscription and close its channel.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut inner = self.inner.write().expect("event bus lock poisoned");
        inner.subscribers.retain(|sub| sub.id != subscription.id);
    }

    /// All published events with a timestamp at or after `since`, in
    /// publication order. `None` returns the full retained history.
    pub fn history(&self, since: Option<DateTime<Utc>>) -> Vec<Event> {
        let inner = self.inner.read().expect("event bus lock poisoned");
        match since {
            None => inner.history.iter().cloned().collect(),
            Some(since) => inner
                .history
                .iter()
                .filter(|e| e.timestamp >= since)
                .cloned()
                .collect(),
        }
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().expect("event bus lock poisoned").subscribers.len()
    }
}

impl EventPublisher for MemoryBus {
    fn publish_event(
        &self,
        kind: EventKind,
        data: Value,
        step_index: Option<usize>,
        duration: Option<Duration>,
    ) {
        let mut event = Event::new(kind, data);
        event.step_index = step_index;
        event.duration_ms = duration.map(|d| d.as_millis() as u64);
        self.publish(event);
    }
}
