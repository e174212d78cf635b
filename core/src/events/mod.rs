//! Runtime event model and the in-memory pub/sub bus.

mod bus;
mod types;

pub use bus::{EventPublisher, MemoryBus, Subscription, SUBSCRIBER_CAPACITY};
pub use types::{Event, EventKind};
