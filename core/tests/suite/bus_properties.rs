//! Event bus invariants: history completeness, eviction, and drop isolation.

use agentrun_core::events::{Event, EventKind, MemoryBus, SUBSCRIBER_CAPACITY};
use proptest::prelude::*;
use serde_json::json;

fn message(n: u64) -> Event {
    Event::new(EventKind::AgentMessage, json!({ "n": n }))
}

#[test]
fn history_is_complete_when_capacity_suffices() {
    let bus = MemoryBus::with_history_capacity(1000);
    for n in 0..500 {
        bus.publish(message(n));
    }
    let history = bus.history(None);
    assert_eq!(history.len(), 500);
    for (i, event) in history.iter().enumerate() {
        assert_eq!(event.data["n"], json!(i as u64));
    }
}

#[tokio::test]
async fn slow_subscriber_never_reduces_history_or_other_subscribers() {
    let bus = MemoryBus::new();
    let mut slow = bus.subscribe(&[]);
    let mut fast = bus.subscribe(&[]);

    let total = (SUBSCRIBER_CAPACITY * 3) as u64;
    let mut fast_seen = 0u64;
    for n in 0..total {
        bus.publish(message(n));
        while fast.try_recv().is_some() {
            fast_seen += 1;
        }
    }
    while fast.try_recv().is_some() {
        fast_seen += 1;
    }

    // The fast subscriber and the history saw every publish.
    assert_eq!(fast_seen, total);
    assert_eq!(bus.history(None).len(), total as usize);

    // The slow subscriber dropped everything past its channel capacity.
    let mut slow_seen = 0u64;
    while slow.try_recv().is_some() {
        slow_seen += 1;
    }
    assert_eq!(slow_seen, SUBSCRIBER_CAPACITY as u64);
}

#[tokio::test]
async fn publish_does_not_block_when_no_subscriber_reads() {
    let bus = MemoryBus::new();
    let _parked = bus.subscribe(&[]);
    // Far beyond channel capacity; this must complete immediately.
    for n in 0..10_000 {
        bus.publish(message(n));
    }
    assert_eq!(bus.history(None).len(), 10_000);
}

proptest! {
    /// Publishing N events through a bus with capacity C retains exactly the
    /// last min(N, C) events, in order.
    #[test]
    fn history_eviction_keeps_newest_in_order(
        capacity in 1usize..64,
        count in 0usize..200,
    ) {
        let bus = MemoryBus::with_history_capacity(capacity);
        for n in 0..count {
            bus.publish(message(n as u64));
        }

        let history = bus.history(None);
        let expected_len = count.min(capacity);
        prop_assert_eq!(history.len(), expected_len);

        let first_kept = count - expected_len;
        for (i, event) in history.iter().enumerate() {
            prop_assert_eq!(event.data["n"].as_u64().unwrap(), (first_kept + i) as u64);
        }
    }
}
