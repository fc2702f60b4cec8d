//! In-process publish/subscribe bus for live event consumers.
//!
//! Grounded in `toka-bus-core`'s `EventBus`/`InMemoryBus` pair: a thin
//! wrapper over `tokio::sync::broadcast` that lets multiple in-process
//! consumers (Sentinel, progress monitors, a CLI `tail` command) observe
//! events as they are appended, without being the system of record — the
//! Akashic Record (`hive-record`) is. A subscriber that falls behind the
//! channel's buffer observes a lagged receiver error rather than blocking
//! the publisher.

#![forbid(unsafe_code)]

use std::sync::Arc;

use hive_types::EventId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Default broadcast channel capacity; matches the teacher's default.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A lightweight projection of a recorded event, suitable for live
/// fan-out. Carries enough to route and display without re-deriving the
/// hash-chain fields that only the AR itself needs to reason about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    /// Identifier of the underlying event.
    pub id: EventId,
    /// Dotted-namespace type discriminator (e.g. `task.completed`).
    pub event_type: String,
    /// Stream (`run_id` or `hive_id`) the event belongs to.
    pub stream_id: String,
    /// The event's payload, verbatim.
    pub payload: serde_json::Value,
}

/// Errors surfaced by the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The underlying broadcast channel has no receivers.
    #[error("no subscribers registered")]
    NoSubscribers,
}

/// Capability to publish and subscribe to the live event stream.
pub trait EventBus: Send + Sync {
    /// Publishes `event` to all current subscribers. A lack of subscribers
    /// is not an error: the event is simply dropped, matching
    /// `tokio::sync::broadcast`'s semantics.
    fn publish(&self, event: BusEvent);

    /// Subscribes to the live stream, returning a receiver that will
    /// observe every event published after this call.
    fn subscribe(&self) -> broadcast::Receiver<BusEvent>;
}

/// An [`EventBus`] backed entirely by an in-memory broadcast channel.
/// Appropriate for a single process; does not survive a restart (the AR
/// itself is the durable record).
#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusEvent>>,
}

impl InMemoryBus {
    /// Creates a bus with [`DEFAULT_BUS_CAPACITY`] buffered events.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Creates a bus with an explicit buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        InMemoryBus {
            sender: Arc::new(sender),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, event: BusEvent) {
        // A send error just means there are currently no receivers; that is
        // not a failure of the bus itself.
        let _ = self.sender.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::new_event_id;

    fn sample(stream: &str, ty: &str) -> BusEvent {
        BusEvent {
            id: new_event_id(),
            event_type: ty.to_string(),
            stream_id: stream.to_string(),
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn basic_publish_subscribe() {
        let bus = InMemoryBus::new();
        let mut rx = bus.subscribe();
        bus.publish(sample("run-1", "task.created"));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.event_type, "task.created");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_a_copy() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(sample("run-1", "run.completed"));
        assert_eq!(a.recv().await.unwrap().event_type, "run.completed");
        assert_eq!(b.recv().await.unwrap().event_type, "run.completed");
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_a_lag_error_not_a_hang() {
        let bus = InMemoryBus::with_capacity(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(sample("run-1", &format!("event.{i}")));
        }
        let err = rx.recv().await.unwrap_err();
        assert!(matches!(err, broadcast::error::RecvError::Lagged(_)));
    }
}
