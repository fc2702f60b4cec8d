//! Governance state machines (spec §4.3).
//!
//! Grounded in `colonyforge.core.state.machines`
//! (`original_source/src/colonyforge/core/state/machines.py`): each
//! machine is a transition table `(from_state, event_type) -> {to_state,
//! guard?}`. The Rust translation keeps the table-driven shape but
//! expresses it as a `match` over strongly-typed states rather than a
//! dictionary keyed by strings, so an invalid transition is a typed error
//! rather than a silent no-op.

#![forbid(unsafe_code)]

pub mod oscillation;
pub mod ra;

pub use oscillation::OscillationDetector;
pub use ra::RaMachine;

use hive_record::taxonomy::types;
use hive_types::{ColonyState, HiveState, RequirementState, RunState, TaskState};
use thiserror::Error;

/// Errors raised attempting an invalid or guard-rejected transition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No transition exists for `(from_state, event_type)`.
    #[error("no transition from {from_state:?} on event {event_type:?}")]
    InvalidTransition {
        /// The state the machine was in.
        from_state: String,
        /// The event type that was rejected.
        event_type: String,
    },
    /// A transition exists but its guard rejected this attempt.
    #[error("guard rejected transition: {0}")]
    GuardRejected(String),
    /// The oscillation detector observed an alternating state pattern.
    #[error("oscillation detected: state history alternates without converging")]
    Oscillation,
}

/// The Run state machine (spec §4.3): `RUNNING -> {COMPLETED, FAILED,
/// ABORTED}`, all of which are terminal.
pub struct RunMachine;

impl RunMachine {
    /// Applies `event_type` to `from`, returning the resulting state.
    pub fn transition(from: RunState, event_type: &str) -> Result<RunState, StateError> {
        match (from, event_type) {
            (RunState::Running, t) if t == types::RUN_COMPLETED => Ok(RunState::Completed),
            (RunState::Running, t) if t == types::RUN_FAILED => Ok(RunState::Failed),
            (RunState::Running, t)
                if t == types::RUN_ABORTED || t == types::SYSTEM_EMERGENCY_STOP =>
            {
                Ok(RunState::Aborted)
            }
            _ => Err(StateError::InvalidTransition {
                from_state: format!("{from:?}"),
                event_type: event_type.to_string(),
            }),
        }
    }

    /// Whether a run in `state` rejects further task/requirement creation
    /// (spec invariant IN-8).
    pub fn is_terminal(state: RunState) -> bool {
        matches!(
            state,
            RunState::Completed | RunState::Failed | RunState::Aborted
        )
    }
}

/// Guard/context needed by [`TaskMachine::transition`]'s retry rule.
#[derive(Debug, Clone, Copy)]
pub struct TaskRetryContext {
    /// Number of times this task has already been retried.
    pub retry_count: u32,
    /// Configured ceiling on retries (`HiveConfig::max_retries`).
    pub max_retries: u32,
}

/// The Task state machine (spec §4.3): `PENDING -> IN_PROGRESS -> {BLOCKED
/// <-> IN_PROGRESS, COMPLETED, FAILED}`; `FAILED -> PENDING` guarded by
/// `retry_count < max_retries`.
pub struct TaskMachine;

impl TaskMachine {
    /// Applies `event_type` to `from`, returning the resulting state.
    /// `retry` is consulted only for the `FAILED -> PENDING` edge.
    pub fn transition(
        from: TaskState,
        event_type: &str,
        retry: TaskRetryContext,
    ) -> Result<TaskState, StateError> {
        match (from, event_type) {
            (TaskState::Pending, t) if t == types::TASK_ASSIGNED => Ok(TaskState::InProgress),
            (TaskState::InProgress, t) if t == types::TASK_BLOCKED => Ok(TaskState::Blocked),
            (TaskState::Blocked, t) if t == types::TASK_UNBLOCKED => Ok(TaskState::InProgress),
            (TaskState::InProgress, t) if t == types::TASK_COMPLETED => Ok(TaskState::Completed),
            (TaskState::InProgress, t) if t == types::TASK_FAILED => Ok(TaskState::Failed),
            (TaskState::Failed, t) if t == types::TASK_CREATED => {
                if retry.retry_count < retry.max_retries {
                    Ok(TaskState::Pending)
                } else {
                    Err(StateError::GuardRejected(format!(
                        "retry_count {} >= max_retries {}",
                        retry.retry_count, retry.max_retries
                    )))
                }
            }
            _ => Err(StateError::InvalidTransition {
                from_state: format!("{from:?}"),
                event_type: event_type.to_string(),
            }),
        }
    }
}

/// The Requirement state machine (spec §4.3): `PENDING -> {APPROVED,
/// REJECTED}`.
pub struct RequirementMachine;

impl RequirementMachine {
    /// Applies `event_type` to `from`, returning the resulting state.
    pub fn transition(
        from: RequirementState,
        event_type: &str,
    ) -> Result<RequirementState, StateError> {
        match (from, event_type) {
            (RequirementState::Pending, t) if t == types::REQUIREMENT_APPROVED => {
                Ok(RequirementState::Approved)
            }
            (RequirementState::Pending, t) if t == types::REQUIREMENT_REJECTED => {
                Ok(RequirementState::Rejected)
            }
            _ => Err(StateError::InvalidTransition {
                from_state: format!("{from:?}"),
                event_type: event_type.to_string(),
            }),
        }
    }

    /// RT-2: resolving an already-resolved requirement is rejected, not a
    /// silent no-op.
    pub fn is_resolved(state: RequirementState) -> bool {
        !matches!(state, RequirementState::Pending)
    }
}

/// The Hive state machine (spec §4.3): `ACTIVE <-> IDLE` via last/first
/// colony completion; both `-> CLOSED`.
pub struct HiveMachine;

impl HiveMachine {
    /// Computes the next hive state given whether any colony remains
    /// active, or an explicit close.
    pub fn transition(
        from: HiveState,
        event_type: &str,
        any_colony_active: bool,
    ) -> Result<HiveState, StateError> {
        match (from, event_type) {
            (HiveState::Active | HiveState::Idle, t) if t == types::HIVE_CLOSED => {
                Ok(HiveState::Closed)
            }
            (HiveState::Idle, t) if t == types::COLONY_STARTED => Ok(HiveState::Active),
            (HiveState::Active, t)
                if t == types::COLONY_COMPLETED || t == types::COLONY_FAILED =>
            {
                Ok(if any_colony_active {
                    HiveState::Active
                } else {
                    HiveState::Idle
                })
            }
            _ => Err(StateError::InvalidTransition {
                from_state: format!("{from:?}"),
                event_type: event_type.to_string(),
            }),
        }
    }
}

/// The Colony state machine (spec §4.3): `PENDING -> IN_PROGRESS ->
/// {COMPLETED, FAILED, SUSPENDED}`; `SUSPENDED -> IN_PROGRESS or FAILED`.
pub struct ColonyMachine;

impl ColonyMachine {
    /// Applies `event_type` to `from`, returning the resulting state.
    pub fn transition(from: ColonyState, event_type: &str) -> Result<ColonyState, StateError> {
        match (from, event_type) {
            (ColonyState::Pending, t) if t == types::COLONY_STARTED => {
                Ok(ColonyState::InProgress)
            }
            (ColonyState::InProgress, t) if t == types::COLONY_COMPLETED => {
                Ok(ColonyState::Completed)
            }
            (ColonyState::InProgress, t) if t == types::COLONY_FAILED => Ok(ColonyState::Failed),
            (ColonyState::InProgress, t) if t == types::COLONY_SUSPENDED => {
                Ok(ColonyState::Suspended)
            }
            (ColonyState::Suspended, t) if t == types::COLONY_STARTED => {
                Ok(ColonyState::InProgress)
            }
            (ColonyState::Suspended, t) if t == types::COLONY_FAILED => Ok(ColonyState::Failed),
            _ => Err(StateError::InvalidTransition {
                from_state: format!("{from:?}"),
                event_type: event_type.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_terminal_states_reject_further_events() {
        assert!(RunMachine::is_terminal(RunState::Completed));
        assert!(RunMachine::transition(RunState::Completed, types::RUN_FAILED).is_err());
    }

    #[test]
    fn task_retry_guard_blocks_after_max_retries() {
        let ctx = TaskRetryContext {
            retry_count: 3,
            max_retries: 3,
        };
        let err = TaskMachine::transition(TaskState::Failed, types::TASK_CREATED, ctx).unwrap_err();
        assert!(matches!(err, StateError::GuardRejected(_)));
    }

    #[test]
    fn task_retry_guard_allows_below_max_retries() {
        let ctx = TaskRetryContext {
            retry_count: 1,
            max_retries: 3,
        };
        let next = TaskMachine::transition(TaskState::Failed, types::TASK_CREATED, ctx).unwrap();
        assert_eq!(next, TaskState::Pending);
    }

    #[test]
    fn requirement_resolution_is_one_shot() {
        assert!(!RequirementMachine::is_resolved(RequirementState::Pending));
        assert!(RequirementMachine::is_resolved(RequirementState::Approved));
        // RT-2: a second resolution attempt from a resolved state has no
        // valid transition.
        assert!(RequirementMachine::transition(
            RequirementState::Approved,
            types::REQUIREMENT_APPROVED
        )
        .is_err());
    }

    #[test]
    fn hive_goes_idle_when_last_colony_completes() {
        let next = HiveMachine::transition(HiveState::Active, types::COLONY_COMPLETED, false)
            .unwrap();
        assert_eq!(next, HiveState::Idle);
    }

    #[test]
    fn colony_suspended_can_resume_or_fail() {
        assert_eq!(
            ColonyMachine::transition(ColonyState::Suspended, types::COLONY_STARTED).unwrap(),
            ColonyState::InProgress
        );
        assert_eq!(
            ColonyMachine::transition(ColonyState::Suspended, types::COLONY_FAILED).unwrap(),
            ColonyState::Failed
        );
    }
}
