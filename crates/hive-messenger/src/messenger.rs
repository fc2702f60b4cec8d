//! Priority FIFO messenger between colonies (spec §4.4).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of message being exchanged (mirrors
/// `colonyforge.queen_bee.communication.MessageType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Expects a `Response` carrying the same `correlation_id`.
    Request,
    /// Answers a prior `Request`.
    Response,
    /// Fire-and-forget, no reply expected.
    Notification,
    /// Sent to every registered colony except the sender.
    Broadcast,
}

/// Delivery priority; `URGENT` is served before `HIGH`, before `NORMAL`,
/// before `LOW` (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    /// Lowest priority; delivered last.
    Low,
    /// Default priority.
    Normal,
    /// Delivered before `Normal`/`Low`.
    High,
    /// Delivered before everything else.
    Urgent,
}

/// One message in transit between colonies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColonyMessage {
    /// Unique identifier, used by `respond` to pair a reply.
    pub id: String,
    /// Sending colony.
    pub from: String,
    /// Receiving colony.
    pub to: String,
    /// What kind of message this is.
    pub message_type: MessageType,
    /// Dotted-namespace event type carried in the message.
    pub event_type: String,
    /// Arbitrary payload.
    pub payload: serde_json::Value,
    /// Delivery priority.
    pub priority: MessagePriority,
    /// When set on a `Response`, names the `id` of the `Request` it answers.
    pub correlation_id: Option<String>,
}

/// A single colony's priority-ordered inbox.
#[derive(Default)]
struct MessageQueue {
    items: VecDeque<ColonyMessage>,
}

impl MessageQueue {
    /// Inserts `msg` immediately before the first lower-priority entry, or
    /// at the tail if none is lower — giving FIFO order within a priority
    /// tier and priority order across tiers (spec §4.4).
    fn enqueue(&mut self, msg: ColonyMessage) {
        let pos = self
            .items
            .iter()
            .position(|existing| existing.priority < msg.priority)
            .unwrap_or(self.items.len());
        self.items.insert(pos, msg);
    }

    fn dequeue(&mut self) -> Option<ColonyMessage> {
        self.items.pop_front()
    }

    fn peek(&self) -> Option<&ColonyMessage> {
        self.items.front()
    }
}

/// Errors raised by the messenger.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// The recipient colony has not been registered.
    #[error("colony {0:?} is not registered")]
    UnknownColony(String),
}

/// Routes [`ColonyMessage`]s between registered colonies via per-colony
/// priority queues.
pub struct ColonyMessenger {
    queues: Mutex<HashMap<String, MessageQueue>>,
}

impl Default for ColonyMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl ColonyMessenger {
    /// Builds a messenger with no colonies registered.
    pub fn new() -> Self {
        ColonyMessenger {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `colony_id`, creating its empty inbox.
    pub fn register_colony(&self, colony_id: &str) {
        self.queues
            .lock()
            .expect("messenger mutex poisoned")
            .entry(colony_id.to_string())
            .or_default();
    }

    /// Removes `colony_id` and discards any messages still queued for it
    /// (spec §5 cancellation semantics: "queued messages to the colony are
    /// discarded").
    pub fn unregister_colony(&self, colony_id: &str) {
        self.queues
            .lock()
            .expect("messenger mutex poisoned")
            .remove(colony_id);
    }

    /// Enqueues a message for `to`, returning its id. Fails if `to` has
    /// not been registered.
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &self,
        from: &str,
        to: &str,
        event_type: &str,
        payload: serde_json::Value,
        priority: MessagePriority,
        correlation_id: Option<String>,
    ) -> Result<String, MessengerError> {
        let id = Uuid::new_v4().to_string();
        let msg = ColonyMessage {
            id: id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            message_type: if correlation_id.is_some() {
                MessageType::Response
            } else {
                MessageType::Request
            },
            event_type: event_type.to_string(),
            payload,
            priority,
            correlation_id,
        };
        let mut queues = self.queues.lock().expect("messenger mutex poisoned");
        let queue = queues
            .get_mut(to)
            .ok_or_else(|| MessengerError::UnknownColony(to.to_string()))?;
        queue.enqueue(msg);
        Ok(id)
    }

    /// Enqueues one copy of a `Broadcast` message to every registered
    /// colony except `from`.
    pub fn broadcast(&self, from: &str, event_type: &str, payload: serde_json::Value) {
        let mut queues = self.queues.lock().expect("messenger mutex poisoned");
        let recipients: Vec<String> = queues.keys().filter(|k| k.as_str() != from).cloned().collect();
        for to in recipients {
            let msg = ColonyMessage {
                id: Uuid::new_v4().to_string(),
                from: from.to_string(),
                to: to.clone(),
                message_type: MessageType::Broadcast,
                event_type: event_type.to_string(),
                payload: payload.clone(),
                priority: MessagePriority::Normal,
                correlation_id: None,
            };
            queues.get_mut(&to).expect("just listed this key").enqueue(msg);
        }
    }

    /// Pops the highest-priority, oldest message for `colony_id`, if any.
    pub fn receive(&self, colony_id: &str) -> Option<ColonyMessage> {
        self.queues
            .lock()
            .expect("messenger mutex poisoned")
            .get_mut(colony_id)?
            .dequeue()
    }

    /// Looks at the next message for `colony_id` without removing it.
    pub fn peek(&self, colony_id: &str) -> Option<ColonyMessage> {
        self.queues
            .lock()
            .expect("messenger mutex poisoned")
            .get(colony_id)?
            .peek()
            .cloned()
    }

    /// Number of messages currently queued for `colony_id`.
    pub fn pending_count(&self, colony_id: &str) -> usize {
        self.queues
            .lock()
            .expect("messenger mutex poisoned")
            .get(colony_id)
            .map(|q| q.items.len())
            .unwrap_or(0)
    }

    /// Sends a reply to `request`, pairing it via `correlation_id`.
    pub fn respond(
        &self,
        request: &ColonyMessage,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<String, MessengerError> {
        self.send(
            &request.to,
            &request.from,
            event_type,
            payload,
            request.priority,
            Some(request.id.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_overtakes_fifo_order() {
        let m = ColonyMessenger::new();
        m.register_colony("c1");
        m.send("c0", "c1", "x", serde_json::json!({}), MessagePriority::Normal, None)
            .unwrap();
        m.send("c0", "c1", "y", serde_json::json!({}), MessagePriority::Urgent, None)
            .unwrap();
        let first = m.receive("c1").unwrap();
        assert_eq!(first.event_type, "y");
    }

    #[test]
    fn same_priority_preserves_fifo() {
        let m = ColonyMessenger::new();
        m.register_colony("c1");
        m.send("c0", "c1", "first", serde_json::json!({}), MessagePriority::Normal, None)
            .unwrap();
        m.send("c0", "c1", "second", serde_json::json!({}), MessagePriority::Normal, None)
            .unwrap();
        assert_eq!(m.receive("c1").unwrap().event_type, "first");
        assert_eq!(m.receive("c1").unwrap().event_type, "second");
    }

    #[test]
    fn broadcast_skips_the_sender() {
        let m = ColonyMessenger::new();
        m.register_colony("c1");
        m.register_colony("c2");
        m.broadcast("c1", "announce", serde_json::json!({}));
        assert_eq!(m.pending_count("c1"), 0);
        assert_eq!(m.pending_count("c2"), 1);
    }

    #[test]
    fn respond_pairs_via_correlation_id() {
        let m = ColonyMessenger::new();
        m.register_colony("c1");
        m.register_colony("c2");
        m.send("c1", "c2", "ping", serde_json::json!({}), MessagePriority::Normal, None)
            .unwrap();
        let req = m.receive("c2").unwrap();
        m.respond(&req, "pong", serde_json::json!({})).unwrap();
        let reply = m.receive("c1").unwrap();
        assert_eq!(reply.correlation_id, Some(req.id));
        assert_eq!(reply.message_type, MessageType::Response);
    }

    #[test]
    fn send_to_unregistered_colony_fails() {
        let m = ColonyMessenger::new();
        assert!(m
            .send("c1", "ghost", "x", serde_json::json!({}), MessagePriority::Normal, None)
            .is_err());
    }
}
