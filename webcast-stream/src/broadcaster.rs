//! Best-effort fanout of normalized events to subscribers.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::RelayEvent;

/// Opaque handle identifying a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fans normalized events out to every registered subscriber.
///
/// Each subscriber is a channel of serialized envelopes. Fanout is
/// fire-and-forget: the event is serialized once, delivery is attempted to
/// every subscriber, and a subscriber whose channel is closed is pruned
/// without affecting delivery to the rest. No queuing beyond the channel, no
/// backpressure, no delivery guarantee. Subscribers receive only events
/// generated after they subscribe.
///
/// The subscriber set is its own concurrent map so subscribe/unsubscribe
/// never contend with the session lifecycle lock.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscribers: DashMap<SubscriberId, mpsc::UnboundedSender<String>>,
}

impl Broadcaster {
    /// Create a broadcaster with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber channel, returning its handle.
    pub fn subscribe(&self, sender: mpsc::UnboundedSender<String>) -> SubscriberId {
        let id = SubscriberId(Uuid::new_v4());
        self.subscribers.insert(id, sender);
        tracing::debug!(subscriber = %id, total = self.subscribers.len(), "subscriber added");
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, total = self.subscribers.len(), "subscriber removed");
        }
        removed
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Fan `event` out to all subscribers, returning how many received it.
    ///
    /// Delivery failures are local: the failing subscriber is pruned and
    /// fanout continues. Never propagates an error to the caller.
    pub fn broadcast(&self, event: &RelayEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, kind = ?event.kind, "failed to serialize event, dropping");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut stale = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                stale.push(*entry.key());
            }
        }
        // Prune outside the iteration so shard locks are not held re-entrantly.
        for id in stale {
            self.subscribers.remove(&id);
            tracing::debug!(subscriber = %id, "pruned closed subscriber");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RelayEvent;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        broadcaster.subscribe(tx_a);
        broadcaster.subscribe(tx_b);

        let delivered = broadcaster.broadcast(&RelayEvent::chat("alice", "viewer", "hello"));
        assert_eq!(delivered, 2);

        let payload_a = rx_a.recv().await.expect("subscriber a receives");
        let payload_b = rx_b.recv().await.expect("subscriber b receives");
        assert_eq!(payload_a, payload_b);
        let value: serde_json::Value = serde_json::from_str(&payload_a).expect("valid json");
        assert_eq!(value["type"], "chat");
    }

    #[tokio::test]
    async fn closed_subscriber_is_pruned_without_aborting_fanout() {
        let broadcaster = Broadcaster::new();
        let (tx_closed, rx_closed) = mpsc::unbounded_channel();
        let (tx_open, mut rx_open) = mpsc::unbounded_channel();
        broadcaster.subscribe(tx_closed);
        broadcaster.subscribe(tx_open);
        drop(rx_closed);

        let delivered = broadcaster.broadcast(&RelayEvent::like("alice", "viewer", 3));
        assert_eq!(delivered, 1);
        assert!(rx_open.recv().await.is_some());
        assert_eq!(broadcaster.subscriber_count(), 1);

        // The pruned subscriber does not affect future broadcasts.
        let delivered = broadcaster.broadcast(&RelayEvent::like("alice", "viewer", 4));
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = broadcaster.subscribe(tx);

        assert!(broadcaster.unsubscribe(id));
        assert!(!broadcaster.unsubscribe(id));
        assert_eq!(broadcaster.broadcast(&RelayEvent::member("alice", "viewer")), 0);
        assert!(rx.try_recv().is_err());
    }
}
