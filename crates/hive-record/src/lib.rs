//! The Akashic Record (AR): an append-only, hash-chained event log with
//! deterministic state projections.
//!
//! Grounded in `toka-store-core`'s header/trait split, adapted to the
//! flatter event shape and SHA-256 hashing spec §3/§6 require, and in
//! `colonyforge`'s `AkashicRecord` (`original_source/src/colonyforge/
//! core/ar/storage.py`) for the append algorithm itself.

#![forbid(unsafe_code)]

pub mod backend;
pub mod event;
pub mod log;
pub mod projections;
pub mod taxonomy;

pub use backend::{InMemoryEventLog, JsonlEventLog};
pub use event::Event;
pub use log::{ChainFault, EventLog, RecordError};
