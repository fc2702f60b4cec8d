//! The `Event` wire type and its canonical hash.
//!
//! Grounded in `toka-store-core`'s `EventHeader`/`causal_hash`, adapted to
//! the flatter shape spec §3 asks for (a single self-describing record
//! rather than a header/payload split) and to SHA-256 rather than Blake3,
//! per spec §6 ("Hashing: SHA-256 over a canonical JSON serialization").

use hive_types::EventId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smallvec::SmallVec;

/// Immutable event record (spec §3).
///
/// `hash` and `prev_hash` are hex-encoded SHA-256 digests. `hash` is
/// computed by [`Event::compute_hash`] over every field except `hash`
/// itself; callers must not hand-construct a mismatched hash, which is why
/// [`Event::new`] and [`crate::log::EventLog::append`] are the only ways
/// to produce a fully-populated event in normal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Time-ordered unique identifier (spec invariant I-2).
    pub id: EventId,
    /// Dotted-namespace type discriminator, e.g. `task.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC 3339 timestamp with timezone.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Who performed the action (agent id, user, or `system`).
    pub actor: String,
    /// Stream this event belongs to.
    pub run_id: String,
    /// Task this event concerns, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Colony this event concerns, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colony_id: Option<String>,
    /// Worker this event concerns, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Event-specific data.
    pub payload: serde_json::Value,
    /// Hex-encoded SHA-256 digest of every other field (canonical form).
    pub hash: String,
    /// Hash of the immediately preceding event in this stream, or `null`
    /// for the first event (spec invariant I-1, boundary B-1).
    pub prev_hash: Option<String>,
    /// Causal antecedents across streams, independent of `prev_hash`.
    #[serde(default)]
    pub parents: SmallVec<[EventId; 4]>,
}

impl Event {
    /// Builds a new, unhashed, unchained event. Callers normally go
    /// through [`crate::log::EventLog::append`], which assigns `prev_hash`
    /// and `hash`; this constructor is exposed for tests and for building
    /// the value handed to `append`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_type: impl Into<String>,
        run_id: impl Into<String>,
        actor: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Event {
            id: hive_types::new_event_id(),
            event_type: event_type.into(),
            timestamp: chrono::Utc::now(),
            actor: actor.into(),
            run_id: run_id.into(),
            task_id: None,
            colony_id: None,
            worker_id: None,
            payload,
            hash: String::new(),
            prev_hash: None,
            parents: SmallVec::new(),
        }
    }

    /// Sets the task id, builder-style.
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Sets the colony id, builder-style.
    pub fn with_colony_id(mut self, colony_id: impl Into<String>) -> Self {
        self.colony_id = Some(colony_id.into());
        self
    }

    /// Sets the worker id, builder-style.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// Adds causal parent links, builder-style.
    pub fn with_parents(mut self, parents: impl IntoIterator<Item = EventId>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }

    /// Computes the canonical SHA-256 digest of this event with `hash`
    /// treated as empty and `prev_hash` included as-is, per spec §6.
    ///
    /// The canonical form is a `serde_json` object with keys sorted
    /// lexicographically (achieved by serializing into a `BTreeMap` first)
    /// and `hash` omitted entirely — not merely blanked — so a changed
    /// `hash` field can never accidentally validate.
    pub fn compute_hash(&self) -> String {
        let mut value = serde_json::to_value(self).expect("Event always serializes");
        if let serde_json::Value::Object(ref mut map) = value {
            map.remove("hash");
        }
        let canonical = canonical_json(&value);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns true if `self.hash` matches a freshly computed hash of this
    /// event's other fields (used by `verify_chain`).
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Serializes a `serde_json::Value` with object keys sorted, recursively.
/// `serde_json::Value`'s default `Map` is already a `BTreeMap` when the
/// `preserve_order` feature is disabled (the default), so `to_string` is
/// already canonical in key order; this helper exists to make that
/// guarantee explicit and independent of the crate's feature flags.
fn canonical_json(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let sorted: std::collections::BTreeMap<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), sort(v)))
                    .collect();
                serde_json::to_value(sorted).expect("BTreeMap<String, Value> always serializes")
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

/// Minimal hex encoding, avoiding a dependency on the `hex` crate for a
/// handful of call sites.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let mut s = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_for_same_content() {
        let mut e1 = Event::new("task.created", "run-1", "system", serde_json::json!({"a":1}));
        e1.id = EventId::parse("00000000-0000-0000-0000-000000000001").unwrap();
        e1.timestamp = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let mut e2 = e1.clone();
        assert_eq!(e1.compute_hash(), e2.compute_hash());
        e2.payload = serde_json::json!({"a":2});
        assert_ne!(e1.compute_hash(), e2.compute_hash());
    }

    #[test]
    fn hash_excludes_the_hash_field_itself() {
        let mut e = Event::new("task.created", "run-1", "system", serde_json::json!({}));
        let h1 = e.compute_hash();
        e.hash = "deadbeef".to_string();
        let h2 = e.compute_hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn round_trip_serialize_parse_serialize_is_fixed_point() {
        let mut e = Event::new("task.created", "run-1", "system", serde_json::json!({"x": [1,2,3]}));
        e.hash = e.compute_hash();
        let s1 = serde_json::to_string(&e).unwrap();
        let parsed: Event = serde_json::from_str(&s1).unwrap();
        let s2 = serde_json::to_string(&parsed).unwrap();
        assert_eq!(s1, s2);
    }
}
