//! Filesystem-backed [`EventLog`]: one append-only JSONL file per stream,
//! guarded by a cross-process advisory lock.
//!
//! This is the durable backend spec §4.1/§6 describes. The append
//! algorithm and the exponentially-growing backward tail scan are
//! translated from `colonyforge`'s `AkashicRecord` (`original_source/src/
//! colonyforge/core/ar/storage.py`) into the teacher's async idiom: file
//! I/O and the advisory lock are blocking, so they run on a
//! `spawn_blocking` task rather than on the async executor, the same way
//! the teacher's own blocking storage calls are kept off the reactor.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fs4::FileExt;
use hive_bus_core::{BusEvent, EventBus};
use hive_types::validate_stream_id;
use tracing::instrument;

use crate::event::Event;
use crate::log::{verify_events, ChainFault, EventLog, RecordError};

/// Initial tail-scan chunk size (spec §4.1: "starting at 8 KiB").
const INITIAL_CHUNK: u64 = 8 * 1024;
/// Maximum tail-scan chunk size (spec §4.1: "doubling up to 16 MiB").
const MAX_CHUNK: u64 = 16 * 1024 * 1024;
/// Advisory lock acquisition timeout (spec §5).
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// A durable [`EventLog`] that stores each stream as
/// `<vault>/<stream_id>/events.jsonl`.
#[derive(Clone)]
pub struct JsonlEventLog {
    vault_path: PathBuf,
    bus: Option<Arc<dyn EventBus>>,
}

impl JsonlEventLog {
    /// Builds a log rooted at `vault_path`, creating the directory if it
    /// does not already exist. The vault path is an owned value threaded
    /// through the constructor, not a global (spec §9 design note).
    pub fn new(vault_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let vault_path = vault_path.into();
        std::fs::create_dir_all(&vault_path)?;
        Ok(JsonlEventLog { vault_path, bus: None })
    }

    /// Attaches a live bus that every subsequent append publishes to,
    /// builder-style.
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    fn stream_dir(&self, stream_id: &str) -> PathBuf {
        self.vault_path.join(stream_id)
    }

    fn events_path(&self, stream_id: &str) -> PathBuf {
        self.stream_dir(stream_id).join("events.jsonl")
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

/// Opens (creating if absent) the stream's file in read-write-append mode
/// and blocks, with the 10-second budget from spec §5, until an exclusive
/// advisory lock is held.
fn open_locked(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let deadline = Instant::now() + LOCK_TIMEOUT;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Strips leading UTF-8 continuation bytes (`0x80..=0xBF`) from a byte
/// slice obtained by seeking into the middle of a file, then decodes the
/// remainder tolerantly (spec §9: "UTF-8 tail recovery").
fn decode_utf8_safe(bytes: &[u8]) -> String {
    let start = bytes
        .iter()
        .position(|&b| !(0x80..=0xBF).contains(&b))
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

/// Reads the trailing `chunk_size` bytes (or the whole file, if smaller)
/// and returns the text of the last non-empty line that parses as a
/// complete JSON `Event`, growing the chunk exponentially when the
/// currently visible window's last line is truncated (spec §4.1 append
/// algorithm, steps (b)/(c)/tie-break).
fn find_last_event(file: &mut File, file_len: u64) -> std::io::Result<Option<Event>> {
    if file_len == 0 {
        return Ok(None);
    }
    let mut chunk = INITIAL_CHUNK;
    loop {
        let window = chunk.min(file_len);
        file.seek(SeekFrom::Start(file_len - window))?;
        let mut buf = vec![0u8; window as usize];
        file.read_exact(&mut buf)?;
        let text = decode_utf8_safe(&buf);
        let lines: Vec<&str> = text
            .split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let covers_whole_file = window >= file_len;
        // Try candidates from the last line backward: a line at the very
        // start of our window may itself be a truncated left-fragment of a
        // longer line that got split off by the window boundary, so only
        // trust it if this window already covers the entire file.
        let candidates: &[&str] = if covers_whole_file {
            &lines
        } else if lines.len() > 1 {
            &lines[1..]
        } else {
            &[]
        };

        for line in candidates.iter().rev() {
            if let Ok(event) = serde_json::from_str::<Event>(line) {
                return Ok(Some(event));
            }
        }

        if covers_whole_file {
            return Ok(None);
        }
        if chunk >= MAX_CHUNK {
            return Ok(None);
        }
        chunk = (chunk * 2).min(MAX_CHUNK).max(file_len.min(MAX_CHUNK));
    }
}

#[async_trait]
impl EventLog for JsonlEventLog {
    #[instrument(skip(self, event), fields(stream_id = %stream_id, event_type = %event.event_type))]
    async fn append(&self, stream_id: &str, mut event: Event) -> Result<Event, RecordError> {
        validate_stream_id(stream_id)?;
        let path = self.events_path(stream_id);
        event.run_id = stream_id.to_string();

        let stream_id_owned = stream_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Event, RecordError> {
            let mut file = open_locked(&path).map_err(|source| RecordError::Io {
                stream_id: stream_id_owned.clone(),
                source,
            })?;
            let file_len = file
                .metadata()
                .map_err(|source| RecordError::Io {
                    stream_id: stream_id_owned.clone(),
                    source,
                })?
                .len();
            let last = find_last_event(&mut file, file_len).map_err(|source| RecordError::Io {
                stream_id: stream_id_owned.clone(),
                source,
            })?;
            event.prev_hash = last.map(|e| e.hash);
            event.hash = event.compute_hash();

            let mut line = serde_json::to_string(&event).expect("Event always serializes");
            line.push('\n');
            file.write_all(line.as_bytes())
                .and_then(|_| file.flush())
                .map_err(|source| RecordError::Io {
                    stream_id: stream_id_owned.clone(),
                    source,
                })?;
            let _ = FileExt::unlock(&file);
            Ok(event)
        })
        .await
        .expect("append blocking task does not panic")
        .map(|event| {
            self.publish(stream_id, &event);
            event
        })
    }

    async fn replay(
        &self,
        stream_id: &str,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<Event>, RecordError> {
        validate_stream_id(stream_id)?;
        let path = self.events_path(stream_id);
        let stream_id_owned = stream_id.to_string();
        let events = tokio::task::spawn_blocking(move || -> Result<Vec<Event>, RecordError> {
            read_all(&path, &stream_id_owned)
        })
        .await
        .expect("replay blocking task does not panic")?;
        Ok(match since {
            Some(ts) => events.into_iter().filter(|e| e.timestamp >= ts).collect(),
            None => events,
        })
    }

    async fn get_last_event(&self, stream_id: &str) -> Result<Option<Event>, RecordError> {
        Ok(self.replay(stream_id, None).await?.pop())
    }

    async fn count_events(&self, stream_id: &str) -> Result<u64, RecordError> {
        Ok(self.replay(stream_id, None).await?.len() as u64)
    }

    async fn verify_chain(
        &self,
        stream_id: &str,
    ) -> Result<(bool, Option<ChainFault>), RecordError> {
        let events = self.replay(stream_id, None).await?;
        Ok(verify_events(&events))
    }

    async fn list_streams(&self) -> Result<Vec<String>, RecordError> {
        let vault = self.vault_path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>, RecordError> {
            let mut out = Vec::new();
            let entries = match std::fs::read_dir(&vault) {
                Ok(e) => e,
                Err(_) => return Ok(out),
            };
            for entry in entries.flatten() {
                if entry.path().join("events.jsonl").is_file() {
                    if let Some(name) = entry.file_name().to_str() {
                        out.push(name.to_string());
                    }
                }
            }
            out.sort();
            Ok(out)
        })
        .await
        .expect("list_streams blocking task does not panic")
    }

    async fn export_stream(&self, stream_id: &str) -> Result<Vec<u8>, RecordError> {
        validate_stream_id(stream_id)?;
        let path = self.events_path(stream_id);
        let stream_id_owned = stream_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, RecordError> {
            match std::fs::read(&path) {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(RecordError::NotFound(stream_id_owned))
                }
                Err(source) => Err(RecordError::Io {
                    stream_id: stream_id_owned,
                    source,
                }),
            }
        })
        .await
        .expect("export_stream blocking task does not panic")
    }
}

/// Reads and parses every line of `path`, skipping (not failing on) any
/// line that doesn't parse, in keeping with the forward-compatibility
/// contract that unknown/partial tail content never aborts a replay (spec
/// §4.1 "Replay tolerates unknown event types").
fn read_all(path: &Path, stream_id: &str) -> Result<Vec<Event>, RecordError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RecordError::Io {
                stream_id: stream_id.to_string(),
                source,
            })
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    Ok(text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Event>(l).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_replay_round_trips() {
        let dir = tempdir().unwrap();
        let log = JsonlEventLog::new(dir.path()).unwrap();
        for i in 0..5 {
            log.append(
                "run-1",
                Event::new("task.progressed", "run-1", "system", serde_json::json!({"i": i})),
            )
            .await
            .unwrap();
        }
        let events = log.replay("run-1", None).await.unwrap();
        assert_eq!(events.len(), 5);
        let (ok, _) = log.verify_chain("run-1").await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn empty_stream_yields_null_prev_hash() {
        let dir = tempdir().unwrap();
        let log = JsonlEventLog::new(dir.path()).unwrap();
        let e = log
            .append("run-1", Event::new("run.started", "run-1", "system", serde_json::json!({})))
            .await
            .unwrap();
        assert!(e.prev_hash.is_none());
    }

    #[tokio::test]
    async fn replay_tolerates_a_truncated_trailing_line() {
        let dir = tempdir().unwrap();
        let log = JsonlEventLog::new(dir.path()).unwrap();
        log.append(
            "run-1",
            Event::new("task.created", "run-1", "system", serde_json::json!({})),
        )
        .await
        .unwrap();
        // Simulate a crash mid-write: append a partial, unterminated line.
        let path = dir.path().join("run-1").join("events.jsonl");
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"id\":\"not-fin").unwrap();
        drop(f);

        let events = log.replay("run-1", None).await.unwrap();
        assert_eq!(events.len(), 1);

        // A subsequent append must still chain off the last *complete*
        // event, recovering past the partial tail (spec boundary B-2).
        let next = log
            .append(
                "run-1",
                Event::new("task.assigned", "run-1", "system", serde_json::json!({})),
            )
            .await
            .unwrap();
        assert_eq!(next.prev_hash, Some(events[0].hash.clone()));
    }

    #[tokio::test]
    async fn rejects_path_traversal_stream_ids() {
        let dir = tempdir().unwrap();
        let log = JsonlEventLog::new(dir.path()).unwrap();
        let e = Event::new("task.created", "x", "system", serde_json::json!({}));
        assert!(log.append("../../etc", e).await.is_err());
    }

    #[tokio::test]
    async fn appended_events_are_published_to_an_attached_bus() {
        let dir = tempdir().unwrap();
        let bus = Arc::new(hive_bus_core::InMemoryBus::new());
        let mut rx = bus.subscribe();
        let log = JsonlEventLog::new(dir.path()).unwrap().with_bus(bus);
        log.append("run-1", Event::new("task.created", "run-1", "system", serde_json::json!({})))
            .await
            .unwrap();
        let published = rx.recv().await.unwrap();
        assert_eq!(published.event_type, "task.created");
        assert_eq!(published.stream_id, "run-1");
    }
}
