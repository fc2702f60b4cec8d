//! Event taxonomy.
//!
//! Spec §4.2: "The event type is an open enumeration organized in
//! namespaces ... A parser reads either a raw serialized line or a decoded
//! map and returns the variant; unknown types yield `UnknownEvent`."
//!
//! Rather than a closed Rust `enum` (which would have to be extended and
//! recompiled for every new event type, defeating "open"), the taxonomy is
//! the `event_type: String` field on [`crate::event::Event`] itself,
//! namespaced with a dot. This module is the registry of namespaces and
//! well-known type strings, and the classification used by the projector
//! (`crate::projections`) and by Sentinel/Honeycomb consumers elsewhere in
//! the workspace.

/// The namespaces named in spec §4.2, in the order listed there.
pub const NAMESPACES: &[&str] = &[
    "hive",
    "colony",
    "run",
    "task",
    "requirement",
    "decision",
    "conflict",
    "operation",
    "intervention",
    "worker",
    "guard",
    "sentinel",
    "pipeline",
    "plan",
    "system",
    "ra",
    "github",
];

/// Returns the namespace prefix of a dotted event type, e.g.
/// `"task.completed"` -> `Some("task")`.
pub fn namespace_of(event_type: &str) -> Option<&str> {
    event_type.split('.').next().filter(|s| !s.is_empty())
}

/// Whether `event_type`'s namespace is one this workspace defines handling
/// for. A `false` result does not make the event invalid — it just means
/// the projector will fold it into the `unknown_events` bucket rather than
/// updating typed state, matching spec §4.1's "Replay tolerates unknown
/// event types by yielding an `UnknownEvent`."
pub fn is_known_namespace(event_type: &str) -> bool {
    namespace_of(event_type)
        .map(|ns| NAMESPACES.contains(&ns))
        .unwrap_or(false)
}

/// Well-known, literal event-type strings referenced by the state machines
/// (`hive-state`) and the projector (`crate::projections`). Kept as
/// constants so a typo in either place fails to compile rather than
/// silently mis-handling an event.
pub mod types {
    // run.*
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_ABORTED: &str = "run.aborted";

    // task.*
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_ASSIGNED: &str = "task.assigned";
    pub const TASK_PROGRESSED: &str = "task.progressed";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_BLOCKED: &str = "task.blocked";
    pub const TASK_UNBLOCKED: &str = "task.unblocked";

    // requirement.*
    pub const REQUIREMENT_CREATED: &str = "requirement.created";
    pub const REQUIREMENT_APPROVED: &str = "requirement.approved";
    pub const REQUIREMENT_REJECTED: &str = "requirement.rejected";

    // hive.* / colony.*
    pub const HIVE_CLOSED: &str = "hive.closed";
    pub const COLONY_STARTED: &str = "colony.started";
    pub const COLONY_COMPLETED: &str = "colony.completed";
    pub const COLONY_FAILED: &str = "colony.failed";
    pub const COLONY_SUSPENDED: &str = "colony.suspended";

    // worker.*
    pub const WORKER_STARTED: &str = "worker.started";
    pub const WORKER_PROGRESS: &str = "worker.progress";
    pub const WORKER_COMPLETED: &str = "worker.completed";
    pub const WORKER_FAILED: &str = "worker.failed";

    // guard.*
    pub const GUARD_PASSED: &str = "guard.passed";
    pub const GUARD_CONDITIONAL_PASSED: &str = "guard.conditional_passed";
    pub const GUARD_FAILED: &str = "guard.failed";

    // pipeline.* / plan.*
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    pub const PLAN_FALLBACK_ACTIVATED: &str = "plan.fallback_activated";
    pub const PLAN_VALIDATION_FAILED: &str = "plan.validation_failed";
    pub const PLAN_APPROVAL_REQUIRED: &str = "plan.approval_required";

    // sentinel.*
    pub const SENTINEL_ALERT_RAISED: &str = "sentinel.alert_raised";

    // system.*
    pub const SYSTEM_HEARTBEAT: &str = "system.heartbeat";
    pub const SYSTEM_EMERGENCY_STOP: &str = "system.emergency_stop";

    // ra.*
    pub const RA_INTAKE_RECEIVED: &str = "ra.intake.received";
    pub const RA_TRIAGE_COMPLETED: &str = "ra.triage.completed";
    pub const RA_CONTEXT_ENRICHED: &str = "ra.context.enriched";
    pub const RA_WEB_RESEARCHED: &str = "ra.web.researched";
    pub const RA_HYPOTHESIS_BUILT: &str = "ra.hypothesis.built";
    pub const RA_CLARIFY_GENERATED: &str = "ra.clarify.generated";
    pub const RA_USER_RESPONDED: &str = "ra.user.responded";
    pub const RA_SPEC_SYNTHESIZED: &str = "ra.spec.synthesized";
    pub const RA_CHALLENGE_REVIEWED: &str = "ra.challenge.reviewed";
    pub const RA_REFEREE_COMPARED: &str = "ra.referee.compared";
    pub const RA_GATE_DECIDED: &str = "ra.gate.decided";
    pub const RA_COMPLETED: &str = "ra.completed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_extraction() {
        assert_eq!(namespace_of("task.completed"), Some("task"));
        assert_eq!(namespace_of("ra.gate.decided"), Some("ra"));
        assert_eq!(namespace_of(""), None);
    }

    #[test]
    fn unknown_namespace_is_detected() {
        assert!(!is_known_namespace("frobnicate.wat"));
        assert!(is_known_namespace(types::TASK_CREATED));
    }
}
