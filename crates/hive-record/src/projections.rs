//! Deterministic projections: pure reductions of an event stream to a
//! current state (spec §3/§4.2, invariant I-3/I-4).
//!
//! Every function here is a fold: `fn(impl Iterator<Item = &Event>) -> T`.
//! None of them perform I/O; replaying the same events in the same order
//! always yields bit-identical output (invariant I-3).

use std::collections::BTreeMap;

use hive_types::{ColonyState, HiveState, RequirementState, RunState, TaskState, WorkerState};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::taxonomy::{is_known_namespace, types};

/// An event whose type the projector does not recognize. Carried forward
/// rather than discarded so downstream tooling can still inspect it (spec
/// §4.1: "Replay tolerates unknown event types by yielding an
/// `UnknownEvent` carrying the original payload").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownEvent {
    /// The unrecognized type string.
    pub event_type: String,
    /// The event's payload, untouched.
    pub payload: serde_json::Value,
}

/// Current state of one task within a run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProjection {
    /// Current lifecycle state.
    pub state: TaskState,
    /// Worker currently assigned, if any.
    pub assignee: Option<String>,
    /// Last reported progress in `[0, 100]`.
    pub progress: u8,
    /// Result payload, populated on completion.
    pub result: Option<serde_json::Value>,
    /// Failure reason, populated on failure.
    pub error: Option<String>,
    /// Number of times this task has been retried after failure.
    pub retry_count: u32,
}

impl Default for TaskProjection {
    fn default() -> Self {
        TaskProjection {
            state: TaskState::Pending,
            assignee: None,
            progress: 0,
            result: None,
            error: None,
            retry_count: 0,
        }
    }
}

/// Current state of one requirement within a run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementProjection {
    /// Current lifecycle state.
    pub state: RequirementState,
    /// The requirement's prompt text.
    pub question: String,
    /// The resolving party's answer, if resolved.
    pub answer: Option<String>,
}

/// Current state of an entire Run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProjection {
    /// The run's original goal text.
    pub goal: Option<String>,
    /// Current lifecycle state.
    pub state: RunState,
    /// Tasks seen so far, keyed by `task_id`.
    pub tasks: BTreeMap<String, TaskProjection>,
    /// Requirements seen so far, keyed by `requirement_id`.
    pub requirements: BTreeMap<String, RequirementProjection>,
    /// Total events folded into this projection.
    pub event_count: u64,
    /// Timestamp of the most recent `system.heartbeat`.
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    /// Events whose type this projector did not recognize.
    pub unknown_events: Vec<UnknownEvent>,
}

impl Default for RunProjection {
    fn default() -> Self {
        RunProjection {
            goal: None,
            state: RunState::Running,
            tasks: BTreeMap::new(),
            requirements: BTreeMap::new(),
            event_count: 0,
            last_heartbeat: None,
            unknown_events: Vec::new(),
        }
    }
}

impl RunProjection {
    /// Whether every known task has reached `Completed`.
    pub fn all_tasks_completed(&self) -> bool {
        self.tasks.values().all(|t| t.state == TaskState::Completed)
    }

    /// Ids of tasks not yet in a terminal state.
    pub fn incomplete_task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, t)| !matches!(t.state, TaskState::Completed | TaskState::Failed))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Folds a run's event stream into a [`RunProjection`] (spec §4.2).
///
/// Order matters: callers must supply events in append (stream) order,
/// which `verify_chain`-passing replay guarantees. Folding the same
/// sequence twice always yields the same result (invariant I-4).
pub fn project_run<'a>(events: impl IntoIterator<Item = &'a Event>) -> RunProjection {
    let mut proj = RunProjection::default();
    for event in events {
        proj.event_count += 1;
        apply_run_event(&mut proj, event);
    }
    proj
}

fn apply_run_event(proj: &mut RunProjection, event: &Event) {
    if !is_known_namespace(&event.event_type) {
        proj.unknown_events.push(UnknownEvent {
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
        });
        return;
    }
    match event.event_type.as_str() {
        types::RUN_STARTED => {
            proj.goal = event
                .payload
                .get("goal")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            proj.state = RunState::Running;
        }
        types::RUN_COMPLETED => proj.state = RunState::Completed,
        types::RUN_FAILED => proj.state = RunState::Failed,
        types::RUN_ABORTED | types::SYSTEM_EMERGENCY_STOP => proj.state = RunState::Aborted,
        types::SYSTEM_HEARTBEAT => proj.last_heartbeat = Some(event.timestamp),
        types::TASK_CREATED => {
            if let Some(task_id) = event.task_id.clone() {
                let entry = proj.tasks.entry(task_id).or_default();
                // task.created also drives FAILED -> PENDING retries (spec
                // §4.3); only bump the retry counter when we are re-entering
                // PENDING from a prior FAILED state.
                if entry.state == TaskState::Failed {
                    entry.retry_count += 1;
                }
                entry.state = TaskState::Pending;
                entry.error = None;
            }
        }
        types::TASK_ASSIGNED => {
            if let Some(task_id) = &event.task_id {
                let entry = proj.tasks.entry(task_id.clone()).or_default();
                entry.state = TaskState::InProgress;
                entry.assignee = event
                    .payload
                    .get("assignee")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
        }
        types::TASK_PROGRESSED => {
            if let Some(task_id) = &event.task_id {
                if let Some(entry) = proj.tasks.get_mut(task_id) {
                    if let Some(p) = event.payload.get("progress").and_then(|v| v.as_u64()) {
                        entry.progress = p.min(100) as u8;
                    }
                }
            }
        }
        types::TASK_COMPLETED => {
            if let Some(task_id) = &event.task_id {
                let entry = proj.tasks.entry(task_id.clone()).or_default();
                entry.state = TaskState::Completed;
                entry.progress = 100;
                entry.result = event.payload.get("result").cloned();
            }
        }
        types::TASK_FAILED => {
            if let Some(task_id) = &event.task_id {
                let entry = proj.tasks.entry(task_id.clone()).or_default();
                entry.state = TaskState::Failed;
                entry.error = event
                    .payload
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
        }
        types::TASK_BLOCKED => {
            if let Some(task_id) = &event.task_id {
                proj.tasks.entry(task_id.clone()).or_default().state = TaskState::Blocked;
            }
        }
        types::TASK_UNBLOCKED => {
            if let Some(task_id) = &event.task_id {
                proj.tasks.entry(task_id.clone()).or_default().state = TaskState::InProgress;
            }
        }
        types::REQUIREMENT_CREATED => {
            if let Some(req_id) = event.payload.get("requirement_id").and_then(|v| v.as_str()) {
                proj.requirements.insert(
                    req_id.to_string(),
                    RequirementProjection {
                        state: RequirementState::Pending,
                        question: event
                            .payload
                            .get("question")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        answer: None,
                    },
                );
            }
        }
        types::REQUIREMENT_APPROVED | types::REQUIREMENT_REJECTED => {
            if let Some(req_id) = event.payload.get("requirement_id").and_then(|v| v.as_str()) {
                if let Some(req) = proj.requirements.get_mut(req_id) {
                    req.state = if event.event_type == types::REQUIREMENT_APPROVED {
                        RequirementState::Approved
                    } else {
                        RequirementState::Rejected
                    };
                    req.answer = event
                        .payload
                        .get("answer")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
            }
        }
        _ => {
            // Recognized namespace, but not a type this projector updates
            // typed state for (e.g. `guard.*`, `pipeline.*`); no-op.
        }
    }
}

/// Aggregate view of a Hive (spec §3): which colonies are active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiveAggregate {
    /// Current lifecycle state.
    pub state: Option<HiveState>,
    /// Colonies currently known to be active.
    pub active_colonies: std::collections::BTreeSet<String>,
}

/// Folds a hive's event stream into a [`HiveAggregate`] (spec §4.3:
/// "Hive: ACTIVE <-> IDLE via last/first colony completion; both ->
/// CLOSED").
pub fn project_hive<'a>(events: impl IntoIterator<Item = &'a Event>) -> HiveAggregate {
    let mut agg = HiveAggregate::default();
    for event in events {
        match event.event_type.as_str() {
            types::COLONY_STARTED => {
                if let Some(colony_id) = &event.colony_id {
                    agg.active_colonies.insert(colony_id.clone());
                }
                agg.state = Some(HiveState::Active);
            }
            types::COLONY_COMPLETED | types::COLONY_FAILED => {
                if let Some(colony_id) = &event.colony_id {
                    agg.active_colonies.remove(colony_id);
                }
                agg.state = Some(if agg.active_colonies.is_empty() {
                    HiveState::Idle
                } else {
                    HiveState::Active
                });
            }
            types::HIVE_CLOSED => agg.state = Some(HiveState::Closed),
            _ => {}
        }
    }
    agg
}

/// Current state of a Colony (spec §3/§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColonyProjection {
    /// Current lifecycle state.
    pub state: ColonyState,
}

impl Default for ColonyProjection {
    fn default() -> Self {
        ColonyProjection {
            state: ColonyState::Pending,
        }
    }
}

/// Folds a colony's events into a [`ColonyProjection`].
pub fn project_colony<'a>(events: impl IntoIterator<Item = &'a Event>) -> ColonyProjection {
    let mut proj = ColonyProjection::default();
    for event in events {
        match event.event_type.as_str() {
            types::COLONY_STARTED => proj.state = ColonyState::InProgress,
            types::COLONY_COMPLETED => proj.state = ColonyState::Completed,
            types::COLONY_FAILED => proj.state = ColonyState::Failed,
            types::COLONY_SUSPENDED => proj.state = ColonyState::Suspended,
            _ => {}
        }
    }
    proj
}

/// Current state of a Worker (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProjection {
    /// Current lifecycle state.
    pub state: WorkerState,
    /// Task currently (or most recently) assigned.
    pub current_task_id: Option<String>,
    /// Last reported progress.
    pub progress: u8,
}

impl Default for WorkerProjection {
    fn default() -> Self {
        WorkerProjection {
            state: WorkerState::Idle,
            current_task_id: None,
            progress: 0,
        }
    }
}

/// Folds a worker's events into a [`WorkerProjection`].
pub fn project_worker<'a>(events: impl IntoIterator<Item = &'a Event>) -> WorkerProjection {
    let mut proj = WorkerProjection::default();
    for event in events {
        match event.event_type.as_str() {
            types::WORKER_STARTED => {
                proj.state = WorkerState::Working;
                proj.current_task_id = event.task_id.clone();
                proj.progress = 0;
            }
            types::WORKER_PROGRESS => {
                if let Some(p) = event.payload.get("progress").and_then(|v| v.as_u64()) {
                    proj.progress = p.min(100) as u8;
                }
            }
            types::WORKER_COMPLETED => {
                proj.state = WorkerState::Idle;
                proj.progress = 100;
            }
            types::WORKER_FAILED => {
                let recoverable = event
                    .payload
                    .get("recoverable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                proj.state = if recoverable {
                    WorkerState::Idle
                } else {
                    WorkerState::Error
                };
            }
            _ => {}
        }
    }
    proj
}

pub mod lineage {
    //! Bounded causal-lineage traversal over `parents[]` links.
    //!
    //! Spec §9 design note: "The `parents[]` causal graph can, in
    //! principle, contain cycles across streams if misused; lineage
    //! traversal must be bounded by an explicit `max_depth` and must mark a
    //! `truncated` flag rather than recurse forever." (§11.3 of
    //! `SPEC_FULL.md`.)

    use std::collections::HashSet;

    use hive_types::EventId;

    use crate::event::Event;

    /// Result of a bounded lineage walk.
    #[derive(Debug, Clone, Default)]
    pub struct Lineage {
        /// Ancestor ids discovered, nearest first.
        pub ancestors: Vec<EventId>,
        /// True if `max_depth` was reached before exhausting all ancestors.
        pub truncated: bool,
    }

    /// Walks backward from `start` through `parents[]` links, looking the
    /// antecedent id up in `index` (typically: every event across every
    /// stream, keyed by id) up to `max_depth` hops. Already-visited ids are
    /// skipped so a cycle cannot recurse forever even before the depth
    /// bound is reached.
    pub fn trace(
        start: EventId,
        index: &std::collections::HashMap<EventId, Event>,
        max_depth: usize,
    ) -> Lineage {
        let mut ancestors = Vec::new();
        let mut visited: HashSet<EventId> = HashSet::new();
        let mut frontier = vec![start];
        visited.insert(start);
        let mut depth = 0;
        let mut truncated = false;

        while !frontier.is_empty() && depth < max_depth {
            let mut next = Vec::new();
            for id in &frontier {
                if let Some(event) = index.get(id) {
                    for parent in &event.parents {
                        if visited.insert(*parent) {
                            ancestors.push(*parent);
                            next.push(*parent);
                        }
                    }
                }
            }
            frontier = next;
            depth += 1;
        }
        if !frontier.is_empty() {
            truncated = true;
        }
        Lineage {
            ancestors,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(run: &str, ty: &str, payload: serde_json::Value) -> Event {
        Event::new(ty, run, "system", payload)
    }

    #[test]
    fn happy_path_s1() {
        let events = vec![
            ev("run-1", types::RUN_STARTED, serde_json::json!({"goal": "Write hello.txt"})),
            {
                let mut e = ev("run-1", types::TASK_CREATED, serde_json::json!({}));
                e.task_id = Some("t1".into());
                e
            },
            {
                let mut e = ev("run-1", types::TASK_ASSIGNED, serde_json::json!({"assignee": "worker-1"}));
                e.task_id = Some("t1".into());
                e
            },
            {
                let mut e = ev("run-1", types::TASK_PROGRESSED, serde_json::json!({"progress": 50}));
                e.task_id = Some("t1".into());
                e
            },
            {
                let mut e = ev("run-1", types::TASK_COMPLETED, serde_json::json!({"result": {"path": "hello.txt"}}));
                e.task_id = Some("t1".into());
                e
            },
            ev("run-1", types::RUN_COMPLETED, serde_json::json!({})),
        ];
        let proj = project_run(&events);
        assert_eq!(proj.event_count, 6);
        assert_eq!(proj.state, RunState::Completed);
        assert_eq!(proj.tasks.len(), 1);
        assert_eq!(proj.tasks["t1"].state, TaskState::Completed);
    }

    #[test]
    fn unknown_event_types_are_preserved_not_dropped() {
        let events = vec![ev("run-1", "frobnicate.wat", serde_json::json!({"x": 1}))];
        let proj = project_run(&events);
        assert_eq!(proj.unknown_events.len(), 1);
        assert_eq!(proj.unknown_events[0].event_type, "frobnicate.wat");
    }

    #[test]
    fn incomplete_task_ids_excludes_terminal_states() {
        let events = vec![{
            let mut e = ev("run-1", types::TASK_CREATED, serde_json::json!({}));
            e.task_id = Some("t1".into());
            e
        }];
        let proj = project_run(&events);
        assert_eq!(proj.incomplete_task_ids(), vec!["t1".to_string()]);
        assert!(!proj.all_tasks_completed());
    }
}
