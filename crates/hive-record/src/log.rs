//! The `EventLog` trait: the operations spec §4.1 names for the Akashic
//! Record, independent of storage backend.

use async_trait::async_trait;
use thiserror::Error;

use crate::event::Event;

/// Errors raised by an [`EventLog`] implementation.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The stream id failed the `[A-Za-z0-9_-]+` charset check.
    #[error(transparent)]
    InvalidStreamId(#[from] hive_types::TypesError),
    /// An advisory lock could not be acquired within the configured
    /// timeout (spec §5: "a 10-second acquisition timeout").
    #[error("lock acquisition timed out for stream {0:?}")]
    LockTimeout(String),
    /// The underlying filesystem operation failed.
    #[error("io error on stream {stream_id:?}: {source}")]
    Io {
        /// Stream the failing operation was against.
        stream_id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A stored line could not be parsed as an `Event` even after
    /// exhausting the tail-scan fallback.
    #[error("corrupt event log for stream {0:?}: no parseable trailing line")]
    CorruptLog(String),
    /// The referenced stream has no events yet.
    #[error("stream {0:?} not found")]
    NotFound(String),
}

impl RecordError {
    /// Maps this error onto the stable boundary error code (spec §6/§7).
    pub fn boundary_code(&self) -> hive_types::BoundaryError {
        match self {
            RecordError::NotFound(_) => hive_types::BoundaryError::NotFound,
            RecordError::LockTimeout(_) => hive_types::BoundaryError::Timeout,
            RecordError::InvalidStreamId(_) => hive_types::BoundaryError::ValidationFailed,
            RecordError::Io { .. } | RecordError::CorruptLog(_) => {
                hive_types::BoundaryError::Internal
            }
        }
    }
}

/// A reason `verify_chain` considers a stream's hash chain broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFault {
    /// Index, within the stream, of the first offending event.
    pub index: usize,
    /// What was wrong at that index.
    pub reason: String,
}

/// The append-only, hash-chained, replayable event log (spec §4.1).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends `event` to `stream_id`, assigning `prev_hash` and `hash`,
    /// and returns the fully-populated event (spec §4.1 append algorithm).
    async fn append(&self, stream_id: &str, event: Event) -> Result<Event, RecordError>;

    /// Replays every event in `stream_id`, optionally only those at or
    /// after `since`, in append order.
    async fn replay(
        &self,
        stream_id: &str,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<Event>, RecordError>;

    /// Returns the most recently appended event, if any.
    async fn get_last_event(&self, stream_id: &str) -> Result<Option<Event>, RecordError>;

    /// Returns the number of events appended to `stream_id`.
    async fn count_events(&self, stream_id: &str) -> Result<u64, RecordError>;

    /// Verifies that `event[n].prev_hash == event[n-1].hash` for every `n`
    /// and that every stored `hash` matches a recomputation (spec
    /// invariants IN-1/IN-2).
    async fn verify_chain(&self, stream_id: &str) -> Result<(bool, Option<ChainFault>), RecordError>;

    /// Lists every known stream id.
    async fn list_streams(&self) -> Result<Vec<String>, RecordError>;

    /// Exports the raw canonical bytes of `stream_id` (its JSONL content).
    async fn export_stream(&self, stream_id: &str) -> Result<Vec<u8>, RecordError>;
}

/// Shared verification logic, usable by any [`EventLog`] backend: given a
/// stream's events in order, checks the hash chain.
pub fn verify_events(events: &[Event]) -> (bool, Option<ChainFault>) {
    let mut prev_hash: Option<String> = None;
    for (i, event) in events.iter().enumerate() {
        if !event.hash_is_valid() {
            return (
                false,
                Some(ChainFault {
                    index: i,
                    reason: "stored hash does not match recomputed hash".to_string(),
                }),
            );
        }
        if event.prev_hash != prev_hash {
            return (
                false,
                Some(ChainFault {
                    index: i,
                    reason: format!(
                        "prev_hash {:?} does not match predecessor hash {:?}",
                        event.prev_hash, prev_hash
                    ),
                }),
            );
        }
        prev_hash = Some(event.hash.clone());
    }
    (true, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> Vec<Event> {
        let mut events = Vec::new();
        let mut prev: Option<String> = None;
        for i in 0..n {
            let mut e = Event::new("task.created", "run-1", "system", serde_json::json!({"i": i}));
            e.prev_hash = prev.clone();
            e.hash = e.compute_hash();
            prev = Some(e.hash.clone());
            events.push(e);
        }
        events
    }

    #[test]
    fn verify_chain_passes_for_a_well_formed_chain() {
        let events = chain(5);
        let (ok, fault) = verify_events(&events);
        assert!(ok);
        assert!(fault.is_none());
    }

    #[test]
    fn verify_chain_catches_a_tampered_hash() {
        let mut events = chain(3);
        events[1].payload = serde_json::json!({"tampered": true});
        let (ok, fault) = verify_events(&events);
        assert!(!ok);
        assert_eq!(fault.unwrap().index, 1);
    }

    #[test]
    fn verify_chain_catches_a_broken_link() {
        let mut events = chain(3);
        events[2].prev_hash = Some("0000".to_string());
        let (ok, fault) = verify_events(&events);
        assert!(!ok);
        assert_eq!(fault.unwrap().index, 2);
    }
}
