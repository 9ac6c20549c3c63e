//! Event broadcasting to downstream consumers.
//!
//! Consumers (a chart renderer, a summary printer, a symbol list widget) register by
//! calling [`EventBus::subscribe`] and receive every [`TrackerEvent`] published after
//! that point on their own channel. Broadcast is best-effort: a subscriber whose receiver
//! has been dropped is removed on the next publish.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;
use price_common::Key;
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::CycleReport;

/// Message delivered to subscribers.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A refresh cycle finished; every dispatched fetch has terminated.
    CycleCompleted(Arc<CycleReport>),
    /// The tracked set changed; carries the full new set in insertion order.
    TrackedSetChanged(Vec<Key>),
    /// A fetched sample could not be persisted.
    StorageFailure {
        /// Key whose series rejected the write.
        key: Key,
        /// Rendered storage error.
        message: String,
    },
    /// The scheduler stopped; no further cycles will run.
    Shutdown,
}

/// Fan-out point for [`TrackerEvent`]s.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<TrackerEvent>>>,
}

impl EventBus {
    /// Create a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new consumer.
    pub fn subscribe(&self) -> Receiver<TrackerEvent> {
        let (tx, rx) = unbounded();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.push(tx);
        debug!("EventBus: new subscriber. Total subscribers: {}", subscribers.len());
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: TrackerEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_every_event() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(TrackerEvent::Shutdown);

        assert!(matches!(a.try_recv(), Ok(TrackerEvent::Shutdown)));
        assert!(matches!(b.try_recv(), Ok(TrackerEvent::Shutdown)));
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(TrackerEvent::TrackedSetChanged(Vec::new()));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
