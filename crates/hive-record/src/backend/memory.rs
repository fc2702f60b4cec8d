//! In-memory [`EventLog`] backend.
//!
//! Grounded in `toka-store-memory`'s role relative to `toka-store-core`:
//! a backend good enough to drive the rest of the workspace's unit tests
//! without touching a filesystem, implementing the exact same trait the
//! durable JSONL backend does (§11.1 of `SPEC_FULL.md`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hive_bus_core::{BusEvent, EventBus};
use hive_types::validate_stream_id;
use tokio::sync::RwLock;

use crate::event::Event;
use crate::log::{verify_events, ChainFault, EventLog, RecordError};

/// An [`EventLog`] that keeps every stream's events in a `Vec` behind a
/// single `RwLock`. Not suitable for production (no durability), but
/// exercises the same append/replay/verify contract the JSONL backend
/// does.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    streams: Arc<RwLock<HashMap<String, Vec<Event>>>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl InMemoryEventLog {
    /// Builds an empty log with no live bus attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an empty log that publishes every appended event to `bus`.
    pub fn with_bus(bus: Arc<dyn EventBus>) -> Self {
        InMemoryEventLog { streams: Arc::default(), bus: Some(bus) }
    }

    fn publish(&self, stream_id: &str, event: &Event) {
        if let Some(bus) = &self.bus {
            bus.publish(BusEvent {
                id: event.id,
                event_type: event.event_type.clone(),
                stream_id: stream_id.to_string(),
                payload: event.payload.clone(),
            });
        }
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, stream_id: &str, mut event: Event) -> Result<Event, RecordError> {
        validate_stream_id(stream_id)?;
        let mut streams = self.streams.write().await;
        let stream = streams.entry(stream_id.to_string()).or_default();
        event.prev_hash = stream.last().map(|e| e.hash.clone());
        event.run_id = stream_id.to_string();
        event.hash = event.compute_hash();
        stream.push(event.clone());
        drop(streams);
        self.publish(stream_id, &event);
        Ok(event)
    }

    async fn replay(
        &self,
        stream_id: &str,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<Event>, RecordError> {
        validate_stream_id(stream_id)?;
        let streams = self.streams.read().await;
        let stream = streams.get(stream_id).cloned().unwrap_or_default();
        Ok(match since {
            Some(ts) => stream.into_iter().filter(|e| e.timestamp >= ts).collect(),
            None => stream,
        })
    }

    async fn get_last_event(&self, stream_id: &str) -> Result<Option<Event>, RecordError> {
        validate_stream_id(stream_id)?;
        let streams = self.streams.read().await;
        Ok(streams.get(stream_id).and_then(|s| s.last().cloned()))
    }

    async fn count_events(&self, stream_id: &str) -> Result<u64, RecordError> {
        validate_stream_id(stream_id)?;
        let streams = self.streams.read().await;
        Ok(streams.get(stream_id).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn verify_chain(
        &self,
        stream_id: &str,
    ) -> Result<(bool, Option<ChainFault>), RecordError> {
        validate_stream_id(stream_id)?;
        let streams = self.streams.read().await;
        let stream = streams.get(stream_id).cloned().unwrap_or_default();
        Ok(verify_events(&stream))
    }

    async fn list_streams(&self) -> Result<Vec<String>, RecordError> {
        let streams = self.streams.read().await;
        Ok(streams.keys().cloned().collect())
    }

    async fn export_stream(&self, stream_id: &str) -> Result<Vec<u8>, RecordError> {
        validate_stream_id(stream_id)?;
        let streams = self.streams.read().await;
        let stream = streams.get(stream_id).cloned().unwrap_or_default();
        let mut out = Vec::new();
        for e in &stream {
            out.extend_from_slice(serde_json::to_string(e).unwrap().as_bytes());
            out.push(b'\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_stream_has_null_prev_hash() {
        let log = InMemoryEventLog::new();
        let e = Event::new("task.created", "run-1", "system", serde_json::json!({}));
        let appended = log.append("run-1", e).await.unwrap();
        assert!(appended.prev_hash.is_none());
    }

    #[tokio::test]
    async fn second_event_chains_to_the_first() {
        let log = InMemoryEventLog::new();
        let e1 = log
            .append(
                "run-1",
                Event::new("task.created", "run-1", "system", serde_json::json!({})),
            )
            .await
            .unwrap();
        let e2 = log
            .append(
                "run-1",
                Event::new("task.assigned", "run-1", "system", serde_json::json!({})),
            )
            .await
            .unwrap();
        assert_eq!(e2.prev_hash, Some(e1.hash));
    }

    #[tokio::test]
    async fn rejects_unsafe_stream_ids() {
        let log = InMemoryEventLog::new();
        let e = Event::new("task.created", "x", "system", serde_json::json!({}));
        assert!(log.append("../escape", e).await.is_err());
    }

    #[tokio::test]
    async fn verify_chain_holds_after_several_appends() {
        let log = InMemoryEventLog::new();
        for i in 0..10 {
            log.append(
                "run-1",
                Event::new("task.progressed", "run-1", "system", serde_json::json!({"i": i})),
            )
            .await
            .unwrap();
        }
        let (ok, _) = log.verify_chain("run-1").await.unwrap();
        assert!(ok);
        assert_eq!(log.count_events("run-1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn appended_events_are_published_to_an_attached_bus() {
        let bus = Arc::new(hive_bus_core::InMemoryBus::new());
        let mut rx = bus.subscribe();
        let log = InMemoryEventLog::with_bus(bus);
        log.append("run-1", Event::new("task.created", "run-1", "system", serde_json::json!({})))
            .await
            .unwrap();
        let published = rx.recv().await.unwrap();
        assert_eq!(published.event_type, "task.created");
        assert_eq!(published.stream_id, "run-1");
    }
}
