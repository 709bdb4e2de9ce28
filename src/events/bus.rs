// src/events/bus.rs
//! Fan-out of engine events to subscribers
//!
//! Each subscriber owns an unbounded crossbeam channel, so publishing never
//! blocks the engine. Subscribers that dropped their receiver are pruned on
//! the next publish.

use crate::events::EngineEvent;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Event bus
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,

    /// Events published
    publish_count: AtomicU64,

    /// Deliveries that found a disconnected subscriber
    drop_count: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&self, event: EngineEvent) {
        trace!("Publishing {} ({})", event.kind.name(), event.id);
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        let dropped = (before - subscribers.len()) as u64;
        if dropped > 0 {
            self.drop_count.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            subscribers: self.subscribers.lock().len(),
            publish_count: self.publish_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
        }
    }
}

/// Bus statistics
#[derive(Debug, Clone)]
pub struct BusStats {
    pub subscribers: usize,
    pub publish_count: u64,
    pub drop_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn event(id: &str) -> EngineEvent {
        EngineEvent::new(EventKind::ResourceUnregistered {
            resource_id: id.to_string(),
        })
    }

    #[test]
    fn test_fan_out() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(event("res_1"));

        assert_eq!(a.try_recv().unwrap().kind.name(), "resource_unregistered");
        assert!(b.try_recv().is_ok());
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        let gone = bus.subscribe();
        drop(gone);

        bus.publish_all(vec![event("res_1"), event("res_2")]);

        let stats = bus.stats();
        assert_eq!(stats.subscribers, 1);
        assert_eq!(stats.publish_count, 2);
        assert_eq!(stats.drop_count, 1);
        assert_eq!(keep.try_iter().count(), 2);
    }
}
