//! [`crate::log::EventLog`] backends.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlEventLog;
pub use memory::InMemoryEventLog;
