//! Inter-colony messenger and resource lock manager (spec §4.4).
//!
//! Grounded in `colonyforge.queen_bee.communication`
//! (`original_source/src/colonyforge/queen_bee/communication.py`):
//! `ColonyMessenger`/`MessageQueue` for priority FIFO delivery, and
//! `ResourceConflict` for mutual-exclusion locks with DFS-based deadlock
//! detection over a wait-for graph. Both are protected by a single mutex
//! per data structure (spec §5: "per-queue mutual exclusion... The Lock
//! manager serializes lock-table updates") rather than made lock-free,
//! since contention is expected to be low and correctness of the FIFO
//! ordering (invariant IN-9) is what matters.

#![forbid(unsafe_code)]

pub mod locks;
pub mod messenger;

pub use locks::{LockError, LockTable};
pub use messenger::{ColonyMessage, ColonyMessenger, MessagePriority, MessageType};
