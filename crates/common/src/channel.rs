//! Publish/subscribe event bus
//!
//! Each subscriber owns a bounded async channel. Publishing never blocks:
//! a subscriber whose queue is full misses that event, and a subscriber
//! whose receiver was dropped is pruned on the next publish.

use async_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Default per-subscriber queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Fan-out of events to any number of independent subscribers
pub struct EventBus<T> {
    subscribers: Mutex<Vec<Sender<T>>>,
    capacity: usize,
}

impl<T: Clone> EventBus<T> {
    /// Create a bus whose subscribers each buffer up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber
    ///
    /// The subscriber only sees events published after this call.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = bounded(self.capacity);
        self.lock().push(tx);
        Subscription { rx }
    }

    /// Deliver `event` to every live subscriber
    ///
    /// Returns how many subscribers accepted the event.
    pub fn publish(&self, event: T) -> usize {
        let mut delivered = 0;
        self.lock().retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("Event subscriber queue full, dropping event");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Pruning closed event subscriber");
                false
            }
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Receiving end of an [`EventBus`] subscription
///
/// Dropping it unsubscribes.
pub struct Subscription<T> {
    rx: Receiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next event
    ///
    /// Fails once the bus is gone and the queue is drained.
    pub async fn recv(&self) -> crate::Result<T> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of events waiting in this subscriber's queue
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn into_receiver(self) -> Receiver<T> {
        self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_sees_events_in_order() {
        let bus = EventBus::new(8);
        let first = bus.subscribe();
        let second = bus.subscribe();

        assert_eq!(bus.publish(1u32), 2);
        assert_eq!(bus.publish(2u32), 2);

        assert_eq!(first.recv().await.unwrap(), 1);
        assert_eq!(first.recv().await.unwrap(), 2);
        assert_eq!(second.recv().await.unwrap(), 1);
        assert_eq!(second.recv().await.unwrap(), 2);
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(8);
        bus.publish("early");
        let sub = bus.subscribe();
        assert!(sub.try_recv().is_none());
        bus.publish("late");
        assert_eq!(sub.try_recv(), Some("late"));
    }

    #[test]
    fn test_full_subscriber_drops_without_blocking_others() {
        let bus = EventBus::new(1);
        let slow = bus.subscribe();
        let fast = bus.subscribe();

        assert_eq!(bus.publish(1u8), 2);
        assert_eq!(fast.try_recv(), Some(1));

        // slow still holds event 1
        assert_eq!(bus.publish(2u8), 1);
        assert_eq!(fast.try_recv(), Some(2));
        assert_eq!(slow.try_recv(), Some(1));
        assert!(slow.try_recv().is_none());
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new(4);
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.publish(7i32), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test]
    async fn test_recv_fails_after_bus_dropped() {
        let bus = EventBus::new(4);
        let sub = bus.subscribe();
        bus.publish(3u16);
        drop(bus);

        assert_eq!(sub.recv().await.unwrap(), 3);
        assert!(matches!(sub.recv().await, Err(crate::Error::Channel(_))));
    }
}
