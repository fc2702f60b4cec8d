//! Shared wire types, identifiers, and governance configuration.
//!
//! Every other crate in this workspace depends on `hive-types` for the
//! vocabulary of the event-sourced substrate: identifiers, enums for the
//! governed state machines, the `TaskPlan`/`Evidence`/`GuardReport`/`Episode`
//! data model from the specification, and the `HiveConfig` governance knobs.
//! Nothing in this crate touches I/O; it is pure data plus validation.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod ids;

pub use config::HiveConfig;
pub use ids::{new_event_id, EventId};

/// Maximum length, in bytes, of a free-text goal string accepted anywhere
/// in the system (run goal, task goal, RA intake text).
pub const MAX_GOAL_LEN: usize = 16_384;

/// Maximum number of tasks permitted in a single `TaskPlan`.
pub const MAX_PLAN_TASKS: usize = 512;

/// Stream identifiers (`run_id`, `hive_id`, ...) must match this character
/// class to rule out path traversal when used to build a filesystem path.
pub const STREAM_ID_CHARSET: &str = "A-Za-z0-9_-";

/// Validates a stream identifier against [`STREAM_ID_CHARSET`].
///
/// Returns the identifier unchanged on success so callers can use this as
/// a construction-time guard: `let run_id = validate_stream_id(raw)?;`.
pub fn validate_stream_id(id: &str) -> Result<&str, TypesError> {
    if id.is_empty() || id.len() > 256 {
        return Err(TypesError::InvalidStreamId(id.to_string()));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(TypesError::InvalidStreamId(id.to_string()));
    }
    Ok(id)
}

/// Errors raised by validation in this crate.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A stream identifier failed the `[A-Za-z0-9_-]+` charset check.
    #[error("invalid stream id: {0:?}")]
    InvalidStreamId(String),
    /// A free-text field exceeded its maximum configured length.
    #[error("{field} exceeds maximum length of {max} bytes")]
    TooLong {
        /// Name of the offending field.
        field: &'static str,
        /// The configured maximum.
        max: usize,
    },
    /// A `TaskPlan` failed structural validation (cycle, duplicate id, ...).
    #[error("invalid task plan: {0}")]
    InvalidPlan(String),
}

/// The stable, transport-agnostic error codes from the external handler
/// boundary (spec §6/§7). The out-of-scope HTTP/MCP façade renders these;
/// nothing in this workspace depends on an HTTP type to produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryError {
    /// Unknown stream or entity id.
    NotFound,
    /// Request conflicts with current state (e.g. incomplete tasks on complete).
    Conflict,
    /// A plan failed Guard validation.
    ValidationFailed,
    /// Execution is paused pending an approval decision.
    ApprovalRequired,
    /// A bounded wait (lock, user confirmation) expired.
    Timeout,
    /// Caller lacked the capability for the requested operation.
    PermissionDenied,
    /// Unclassified internal failure.
    Internal,
}

impl fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoundaryError::NotFound => "not_found",
            BoundaryError::Conflict => "conflict",
            BoundaryError::ValidationFailed => "validation_failed",
            BoundaryError::ApprovalRequired => "approval_required",
            BoundaryError::Timeout => "timeout",
            BoundaryError::PermissionDenied => "permission_denied",
            BoundaryError::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Minimal, stable machine-readable detail payload carried alongside a
/// [`BoundaryError`] (spec §7: "No stack traces leak").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryDetail {
    /// Human-readable summary, safe to show a caller.
    pub message: String,
    /// Tasks that were incomplete at the time of a rejected force-complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete_task_ids: Option<Vec<String>>,
    /// Requirements still pending a decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_requirement_ids: Option<Vec<String>>,
    /// Identifier of a pending approval request, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Action classification that triggered an approval gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_class: Option<ActionClass>,
}

// ---------------------------------------------------------------------
// Governance enums
// ---------------------------------------------------------------------

/// Classification of an action's reversibility, used by the approval gate
/// (spec §4.6) and by Sentinel's security-policy scan (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// No observable side effect outside the process.
    ReadOnly,
    /// Has a side effect, but one that can be undone.
    Reversible,
    /// Has a side effect that cannot be undone without external recovery.
    Irreversible,
}

/// User-chosen policy binding approval requirements to action class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Never gate; the system only reports what it did.
    ReportOnly,
    /// Gate only `Irreversible` actions behind an explicit confirmation.
    ProposeConfirm,
    /// Never gate; the system acts autonomously.
    Delegated,
}

impl TrustLevel {
    /// Whether this trust level requires a confirmation before dispatching
    /// an action of the given class (spec §4.6: "only PROPOSE_CONFIRM gates
    /// IRREVERSIBLE actions").
    pub fn requires_confirmation(self, class: ActionClass) -> bool {
        matches!(self, TrustLevel::ProposeConfirm) && class == ActionClass::Irreversible
    }
}

/// The route a requirement-analysis intake takes, chosen by the ambiguity
/// scorer (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisPath {
    /// Goal is unambiguous enough to dispatch immediately.
    InstantPass,
    /// Goal has gaps, but safe default assumptions can fill them.
    AssumptionPass,
    /// Goal requires the full clarification/spec-synthesis pipeline.
    FullAnalysis,
}

// ---------------------------------------------------------------------
// State machine states (spec §4.3)
// ---------------------------------------------------------------------

/// States of a Run's lifecycle (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Actively executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an unrecoverable failure.
    Failed,
    /// Terminated early by operator or emergency stop.
    Aborted,
}

/// States of a Task's lifecycle (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Created, not yet assigned.
    Pending,
    /// Assigned to a worker and executing.
    InProgress,
    /// Waiting on an external condition.
    Blocked,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
}

/// States of a Requirement's lifecycle (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementState {
    /// Awaiting a decision.
    Pending,
    /// Approved by the resolving party.
    Approved,
    /// Rejected by the resolving party.
    Rejected,
}

/// States of a Hive's lifecycle (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HiveState {
    /// At least one colony is active.
    Active,
    /// No colony is currently active.
    Idle,
    /// Permanently closed.
    Closed,
}

/// States of a Colony's lifecycle (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColonyState {
    /// Created, not yet started.
    Pending,
    /// Actively executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
    /// Paused by Sentinel or an operator.
    Suspended,
}

/// States of a Worker's lifecycle (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// No task assigned.
    Idle,
    /// Executing an assigned task.
    Working,
    /// Unrecoverable failure; must be reset externally.
    Error,
}

/// States of the Requirement Analysis pipeline (spec §4.3/§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RaState {
    /// Initial intake of raw goal text.
    Intake,
    /// Ambiguity/context-sufficiency/execution-risk scoring.
    Triage,
    /// Internal evidence gathering.
    ContextEnrich,
    /// Optional external research, gated on open unknowns.
    WebResearch,
    /// Goal/unknown extraction and assumption mapping.
    HypothesisBuild,
    /// Clarification-question generation.
    ClarifyGen,
    /// Awaiting a user's answer to a clarification round.
    UserFeedback,
    /// Specification drafting.
    SpecSynthesis,
    /// Adversarial review of the draft.
    ChallengeReview,
    /// Comparing multiple drafts when more than one exists.
    RefereeCompare,
    /// Completeness gate before dispatch.
    GuardGate,
    /// Terminal: ready to dispatch with no residual concerns.
    ExecutionReady,
    /// Terminal: ready to dispatch, but with residual risk noted.
    ExecutionReadyWithRisks,
    /// Terminal: analysis abandoned.
    Abandoned,
}

impl RaState {
    /// Whether this state is one of the three terminal outcomes.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RaState::ExecutionReady | RaState::ExecutionReadyWithRisks | RaState::Abandoned
        )
    }
}

// ---------------------------------------------------------------------
// Task plan
// ---------------------------------------------------------------------

/// One task within a [`TaskPlan`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Identifier unique within the owning plan.
    pub task_id: String,
    /// Natural-language description of what the task must accomplish.
    pub goal: String,
    /// Sibling `task_id`s that must complete before this task is ready.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Output of goal decomposition: an ordered set of tasks plus the planner's
/// reasoning trace (spec §3/§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    /// The tasks, in no particular execution order (order is derived from
    /// `depends_on` by the orchestrator).
    pub tasks: Vec<PlannedTask>,
    /// Free-text rationale from the planner, kept for audit.
    #[serde(default)]
    pub reasoning: String,
    /// True when this plan is the single-task fallback produced after
    /// malformed planner output (spec §4.6, design note iii).
    #[serde(default)]
    pub is_fallback: bool,
}

impl TaskPlan {
    /// Builds the single-task fallback plan used when the planner's output
    /// could not be parsed into a well-formed plan.
    pub fn fallback(goal: impl Into<String>) -> Self {
        let goal = goal.into();
        TaskPlan {
            tasks: vec![PlannedTask {
                task_id: "t1".to_string(),
                goal,
                depends_on: Vec::new(),
            }],
            reasoning: "fallback: planner output could not be parsed".to_string(),
            is_fallback: true,
        }
    }

    /// Structural (L1) validation: non-empty, unique ids, no unresolved
    /// dependencies, no cycles (spec §3 invariant I-4, §4.7 L1 rules).
    pub fn validate_structure(&self) -> Result<(), TypesError> {
        if self.tasks.is_empty() {
            return Err(TypesError::InvalidPlan("plan has no tasks".to_string()));
        }
        if self.tasks.len() > MAX_PLAN_TASKS {
            return Err(TypesError::InvalidPlan(format!(
                "plan has {} tasks, exceeds limit of {MAX_PLAN_TASKS}",
                self.tasks.len()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for t in &self.tasks {
            if t.goal.trim().is_empty() {
                return Err(TypesError::InvalidPlan(format!(
                    "task {} has an empty goal",
                    t.task_id
                )));
            }
            if !seen.insert(t.task_id.as_str()) {
                return Err(TypesError::InvalidPlan(format!(
                    "duplicate task id {}",
                    t.task_id
                )));
            }
        }
        let ids: std::collections::HashSet<&str> =
            self.tasks.iter().map(|t| t.task_id.as_str()).collect();
        for t in &self.tasks {
            for dep in &t.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(TypesError::InvalidPlan(format!(
                        "task {} depends on unknown task {dep}",
                        t.task_id
                    )));
                }
            }
        }
        detect_cycle(&self.tasks).map_err(TypesError::InvalidPlan)
    }
}

/// Three-colour DFS cycle check over `depends_on` edges.
fn detect_cycle(tasks: &[PlannedTask]) -> Result<(), String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    use std::collections::HashMap;

    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.task_id.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; tasks.len()];

    fn visit(
        i: usize,
        tasks: &[PlannedTask],
        index: &HashMap<&str, usize>,
        marks: &mut [Mark],
    ) -> Result<(), String> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                return Err(format!("cycle detected at task {}", tasks[i].task_id))
            }
            Mark::Unvisited => {}
        }
        marks[i] = Mark::InProgress;
        for dep in &tasks[i].depends_on {
            if let Some(&j) = index.get(dep.as_str()) {
                visit(j, tasks, index, marks)?;
            }
        }
        marks[i] = Mark::Done;
        Ok(())
    }

    for i in 0..tasks.len() {
        visit(i, tasks, &index, &mut marks)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Evidence / Guard report
// ---------------------------------------------------------------------

/// Kind of artifact submitted as input to Guard verification (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// A unified diff of a proposed change.
    Diff,
    /// The outcome of running a test suite.
    TestResult,
    /// A coverage report.
    TestCoverage,
    /// Static-analysis/lint findings.
    Lint,
    /// Type-checker output.
    TypeCheck,
    /// Human or automated review comments.
    Review,
    /// A `TaskPlan` under review.
    Plan,
    /// A report from the context-gathering collaborator.
    ForagerReport,
    /// A report produced by the Referee.
    RefereeReport,
}

/// One artifact submitted to Guard (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Kind of artifact.
    pub evidence_type: EvidenceType,
    /// Where the artifact came from (free text: tool name, agent id, ...).
    pub source: String,
    /// The artifact payload itself.
    pub content: serde_json::Value,
}

/// Two-layer verdict produced by the Guard verifier (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Every rule, L1 and L2, passed.
    Pass,
    /// L1 passed but at least one L2 rule failed.
    ConditionalPass,
    /// At least one L1 rule failed.
    Fail,
}

/// Which layer a Guard rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleLevel {
    /// Structural rule: shape of the plan/evidence itself.
    L1,
    /// Semantic rule: does the content actually address the goal.
    L2,
}

/// Result of evaluating a single Guard rule (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    /// Name of the rule that produced this result.
    pub rule_name: String,
    /// Which layer the rule belongs to.
    pub level: RuleLevel,
    /// Whether the rule passed.
    pub passed: bool,
    /// Human-readable explanation.
    pub message: String,
    /// Evidence type the rule consumed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_type: Option<EvidenceType>,
    /// Arbitrary structured detail for the rule's own bookkeeping.
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Full result of a Guard evaluation (spec §3/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardReport {
    /// Final verdict.
    pub verdict: Verdict,
    /// Whether every L1 rule passed.
    pub l1_passed: bool,
    /// Whether every L2 rule passed.
    pub l2_passed: bool,
    /// Individual rule outcomes, in evaluation order.
    pub rule_results: Vec<RuleResult>,
    /// Why the plan was remanded, populated on `Fail`/`ConditionalPass`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remand_reason: Option<String>,
    /// Concrete suggestions for fixing a failing plan.
    #[serde(default)]
    pub improvement_instructions: Vec<String>,
}

// ---------------------------------------------------------------------
// Episode / KPI
// ---------------------------------------------------------------------

/// Coarse outcome of a finished Run (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Run completed with every task successful.
    Success,
    /// Run completed with a mix of successes and failures.
    Partial,
    /// Run failed or was aborted with no successful tasks.
    Failure,
}

/// Root-cause bucket for a failed Run, derived from keyword matching on the
/// terminal failure event's reason (spec §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The run ran out of time.
    Timeout,
    /// The execution environment was at fault (missing tool, bad sandbox).
    Environment,
    /// A downstream system/integration rejected the work.
    Integration,
    /// The implementation itself was wrong.
    Implementation,
    /// The chosen approach/design was wrong.
    Design,
    /// The specification/goal itself was unclear or contradictory.
    Specification,
}

/// Finalized record of one Run (spec §3), produced by Honeycomb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique id for this episode record, distinct from `run_id` so a run
    /// retried after a failure can produce more than one.
    pub episode_id: EventId,
    /// Run this episode summarizes.
    pub run_id: String,
    /// Colony this run belonged to, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colony_id: Option<String>,
    /// The goal text the run was attempting, for display and grouping.
    #[serde(default)]
    pub goal: String,
    /// Coarse result.
    pub outcome: Outcome,
    /// Wall-clock duration of the run, in seconds.
    pub duration_secs: f64,
    /// Total LLM tokens consumed across the run.
    pub token_count: u64,
    /// Populated when `outcome != Success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_class: Option<FailureClass>,
    /// Number of Sentinel interventions raised during the run.
    pub sentinel_intervention_count: u32,
    /// Arbitrary KPI scores computed for this episode (correctness, etc).
    #[serde(default)]
    pub kpi_scores: std::collections::BTreeMap<String, f64>,
    /// Episodes this one was derived from (retries, forks).
    #[serde(default)]
    pub parent_episode_ids: Vec<String>,
    /// Template name used for this run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_used: Option<String>,
    /// Feature vector describing the task, used by Scout similarity search.
    #[serde(default)]
    pub task_features: std::collections::BTreeMap<String, f64>,
    /// Free-form tags (e.g. trigger source, operator notes).
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,
}

// ---------------------------------------------------------------------
// RA spec draft
// ---------------------------------------------------------------------

/// A synthesized specification draft produced by the RA pipeline (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaSpecDraft {
    /// Identifier stable across revisions of the same draft.
    pub draft_id: String,
    /// Monotonically increasing revision number.
    pub version: u32,
    /// The (possibly refined) goal text.
    pub goal: String,
    /// Criteria that must hold for the goal to be considered satisfied.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Constraints the implementation must respect.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Things explicitly out of scope for this draft.
    #[serde(default)]
    pub non_goals: Vec<String>,
    /// Unresolved items carried forward for visibility.
    #[serde(default)]
    pub open_items: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_stream_id_rejects_traversal() {
        assert!(validate_stream_id("../etc/passwd").is_err());
        assert!(validate_stream_id("run-123_ABC").is_ok());
        assert!(validate_stream_id("").is_err());
    }

    #[test]
    fn trust_level_gates_only_propose_confirm_irreversible() {
        assert!(TrustLevel::ProposeConfirm.requires_confirmation(ActionClass::Irreversible));
        assert!(!TrustLevel::ProposeConfirm.requires_confirmation(ActionClass::ReadOnly));
        assert!(!TrustLevel::ReportOnly.requires_confirmation(ActionClass::Irreversible));
        assert!(!TrustLevel::Delegated.requires_confirmation(ActionClass::Irreversible));
    }

    #[test]
    fn plan_detects_duplicate_ids() {
        let plan = TaskPlan {
            tasks: vec![
                PlannedTask { task_id: "t1".into(), goal: "a".into(), depends_on: vec![] },
                PlannedTask { task_id: "t1".into(), goal: "b".into(), depends_on: vec![] },
            ],
            reasoning: String::new(),
            is_fallback: false,
        };
        assert!(plan.validate_structure().is_err());
    }

    #[test]
    fn plan_detects_cycles() {
        let plan = TaskPlan {
            tasks: vec![
                PlannedTask { task_id: "t1".into(), goal: "a".into(), depends_on: vec!["t2".into()] },
                PlannedTask { task_id: "t2".into(), goal: "b".into(), depends_on: vec!["t1".into()] },
            ],
            reasoning: String::new(),
            is_fallback: false,
        };
        assert!(plan.validate_structure().is_err());
    }

    #[test]
    fn plan_detects_unresolved_dependency() {
        let plan = TaskPlan {
            tasks: vec![PlannedTask {
                task_id: "t1".into(),
                goal: "a".into(),
                depends_on: vec!["ghost".into()],
            }],
            reasoning: String::new(),
            is_fallback: false,
        };
        assert!(plan.validate_structure().is_err());
    }

    #[test]
    fn ra_state_terminal_classification() {
        assert!(RaState::ExecutionReady.is_terminal());
        assert!(RaState::ExecutionReadyWithRisks.is_terminal());
        assert!(RaState::Abandoned.is_terminal());
        assert!(!RaState::Triage.is_terminal());
    }

    #[test]
    fn fallback_plan_is_single_task() {
        let plan = TaskPlan::fallback("do the thing");
        assert!(plan.is_fallback);
        assert_eq!(plan.tasks.len(), 1);
        assert!(plan.validate_structure().is_ok());
    }
}
