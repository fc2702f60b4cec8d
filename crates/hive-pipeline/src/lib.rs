//! Planner-to-execution pipeline: validate, approval-gate, orchestrate,
//! aggregate (spec §4.6).
//!
//! Grounded in `colonyforge.queen_bee.pipeline.ColonyPipeline`: a fixed
//! sequence of stages around the orchestrator, each emitting its own
//! audit event before moving to the next, with a persisted pending-
//! approval table so `resume_with_approval` can re-enter mid-flight.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use hive_orchestrator::{OrchestratorError, TaskContext, TaskExecutor, TaskOrchestrator};
use hive_record::{taxonomy::types as ev, Event, EventLog, RecordError};
use hive_types::{ActionClass, GuardReport, TaskPlan, TrustLevel, Verdict};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Errors raised by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Guard rejected the plan outright (L1 failure).
    #[error("plan failed validation: {0:?}")]
    ValidationFailed(GuardReport),
    /// The orchestrator could not run the (already-validated) plan.
    #[error(transparent)]
    Orchestration(#[from] OrchestratorError),
    /// The event log rejected an append.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// `resume_with_approval` was called with an unknown `request_id`.
    #[error("no pending approval request {0:?}")]
    UnknownApprovalRequest(String),
}

/// Supplies a [`TaskPlan`] for a goal; an LLM-backed implementation lives
/// outside this crate. On malformed output the caller should construct
/// [`TaskPlan::fallback`] itself and still return `Ok`, matching spec
/// §4.6 ("falls back to a single-task plan... emits
/// `plan.fallback_activated`" — the pipeline emits that event whenever
/// `plan.is_fallback` is true, regardless of why).
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produces a plan for `goal` given free-form `context`.
    async fn propose_plan(&self, goal: &str, context: &serde_json::Value) -> TaskPlan;
}

/// Classifies a validated plan's reversibility for the approval gate
/// (spec §4.6).
pub trait ActionClassifier: Send + Sync {
    /// Returns the most severe [`ActionClass`] among the plan's tasks.
    fn classify(&self, plan: &TaskPlan) -> ActionClass;
}

/// Default classifier: everything is [`ActionClass::Irreversible`] unless
/// told otherwise, matching the fail-safe default spec §4.6 implies by
/// gating on the *presence* of an irreversible action rather than its
/// absence.
pub struct AlwaysIrreversible;
impl ActionClassifier for AlwaysIrreversible {
    fn classify(&self, _plan: &TaskPlan) -> ActionClass {
        ActionClass::Irreversible
    }
}

/// A pending approval request persisted across the `approval_required`
/// suspension point (spec §4.6).
#[derive(Debug, Clone)]
pub struct PendingApproval {
    /// Stable identifier handed back to the caller.
    pub request_id: String,
    /// Run this request belongs to.
    pub run_id: String,
    /// Original goal text.
    pub goal: String,
    /// Context the goal was proposed under.
    pub context: serde_json::Value,
    /// The plan awaiting approval.
    pub plan: TaskPlan,
    /// The plan's classified action class.
    pub action_class: ActionClass,
}

/// Final, successful outcome of a pipeline run (spec §4.6: "Aggregate
/// results into a `ColonyResult`").
#[derive(Debug, Clone)]
pub struct ColonyResult {
    /// Run this result belongs to.
    pub run_id: String,
    /// Per-task outcome, keyed by `task_id`.
    pub task_contexts: BTreeMap<String, TaskContext>,
}

impl ColonyResult {
    /// Whether every task in the plan completed successfully.
    pub fn all_completed(&self) -> bool {
        self.task_contexts
            .values()
            .all(|c| c.status == hive_orchestrator::TaskStatus::Completed)
    }
}

/// Outcome of driving the pipeline one step (spec §4.6 stages 3-6).
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Stage 6: the plan ran to completion (tasks may individually have
    /// failed or been skipped; see [`ColonyResult::all_completed`]).
    Completed(ColonyResult),
    /// Stage 4: a confirmation is required before execution can proceed.
    ApprovalRequired { request_id: String },
    /// Stage 4 resolved to a rejection (via `resume_with_approval` or a
    /// rejected pre-supplied approval).
    Rejected { reason: Option<String> },
}

/// Drives plan → execution with a full audit trail (spec §4.6).
pub struct Pipeline<'a> {
    log: &'a dyn EventLog,
    pending: Mutex<HashMap<String, PendingApproval>>,
}

impl<'a> Pipeline<'a> {
    /// Builds a pipeline appending audit events to `log`.
    pub fn new(log: &'a dyn EventLog) -> Self {
        Pipeline { log, pending: Mutex::new(HashMap::new()) }
    }

    /// Runs stages 1-6 of spec §4.6 for a freshly proposed plan.
    #[instrument(skip(self, planner, classifier, executor, context))]
    pub async fn run(
        &self,
        run_id: &str,
        goal: &str,
        context: serde_json::Value,
        planner: &dyn Planner,
        classifier: &dyn ActionClassifier,
        trust_level: TrustLevel,
        pre_supplied_approval: Option<bool>,
        executor: &dyn TaskExecutor,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.append(run_id, ev::PIPELINE_STARTED, serde_json::json!({ "goal": goal })).await?;

        let plan = planner.propose_plan(goal, &context).await;
        if plan.is_fallback {
            self.append(
                run_id,
                ev::PLAN_FALLBACK_ACTIVATED,
                serde_json::json!({ "reasoning": plan.reasoning }),
            )
            .await?;
        }

        let report = hive_guard::evaluate_with_defaults(&plan, goal, &[]);
        if report.verdict == Verdict::Fail {
            self.append(
                run_id,
                ev::PLAN_VALIDATION_FAILED,
                serde_json::json!({ "remand_reason": report.remand_reason }),
            )
            .await?;
            return Err(PipelineError::ValidationFailed(report));
        }

        let action_class = classifier.classify(&plan);
        if trust_level.requires_confirmation(action_class) && pre_supplied_approval.is_none() {
            let request_id = Uuid::new_v4().to_string();
            self.pending.lock().expect("pending-approval mutex poisoned").insert(
                request_id.clone(),
                PendingApproval {
                    request_id: request_id.clone(),
                    run_id: run_id.to_string(),
                    goal: goal.to_string(),
                    context,
                    plan,
                    action_class,
                },
            );
            self.append(
                run_id,
                ev::PLAN_APPROVAL_REQUIRED,
                serde_json::json!({ "request_id": request_id, "action_class": action_class }),
            )
            .await?;
            return Ok(PipelineOutcome::ApprovalRequired { request_id });
        }

        if let Some(false) = pre_supplied_approval {
            return Ok(PipelineOutcome::Rejected { reason: Some("pre-supplied approval was denied".into()) });
        }

        self.execute(run_id, &plan, executor).await
    }

    /// Re-enters the pipeline for a previously suspended `request_id`
    /// (spec §4.6 stage 4: "`resume_with_approval(request_id, approved,
    /// reason)` re-enters the pipeline with the decision").
    #[instrument(skip(self, executor))]
    pub async fn resume_with_approval(
        &self,
        request_id: &str,
        approved: bool,
        reason: Option<String>,
        executor: &dyn TaskExecutor,
    ) -> Result<PipelineOutcome, PipelineError> {
        let pending = self
            .pending
            .lock()
            .expect("pending-approval mutex poisoned")
            .remove(request_id)
            .ok_or_else(|| PipelineError::UnknownApprovalRequest(request_id.to_string()))?;

        if !approved {
            return Ok(PipelineOutcome::Rejected { reason });
        }
        self.execute(&pending.run_id, &pending.plan, executor).await
    }

    /// Currently outstanding approval requests, for a surface layer to
    /// list (e.g. a CLI `list-escalations` command).
    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.pending.lock().expect("pending-approval mutex poisoned").values().cloned().collect()
    }

    async fn execute(
        &self,
        run_id: &str,
        plan: &TaskPlan,
        executor: &dyn TaskExecutor,
    ) -> Result<PipelineOutcome, PipelineError> {
        let task_contexts = TaskOrchestrator::execute_plan(plan, executor).await?;
        let result = ColonyResult { run_id: run_id.to_string(), task_contexts };
        self.append(
            run_id,
            ev::PIPELINE_COMPLETED,
            serde_json::json!({ "all_completed": result.all_completed() }),
        )
        .await?;
        Ok(PipelineOutcome::Completed(result))
    }

    async fn append(
        &self,
        run_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<Event, RecordError> {
        let event = Event::new(event_type, run_id, "system", payload);
        self.log.append(run_id, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_record::InMemoryEventLog;
    use hive_types::PlannedTask;

    struct FixedPlanner(TaskPlan);
    #[async_trait]
    impl Planner for FixedPlanner {
        async fn propose_plan(&self, _goal: &str, _context: &serde_json::Value) -> TaskPlan {
            self.0.clone()
        }
    }

    struct EchoExecutor;
    #[async_trait]
    impl TaskExecutor for EchoExecutor {
        async fn execute(
            &self,
            task_id: &str,
            _goal: &str,
            _context_data: &serde_json::Value,
        ) -> Result<serde_json::Value, String> {
            Ok(serde_json::json!({ "ran": task_id }))
        }
    }

    fn good_plan() -> TaskPlan {
        TaskPlan {
            tasks: vec![PlannedTask {
                task_id: "t1".into(),
                goal: "write the readme file".into(),
                depends_on: vec![],
            }],
            reasoning: String::new(),
            is_fallback: false,
        }
    }

    #[tokio::test]
    async fn report_only_trust_runs_straight_through() {
        let log = InMemoryEventLog::new();
        let pipeline = Pipeline::new(&log);
        let planner = FixedPlanner(good_plan());
        let outcome = pipeline
            .run(
                "run-1",
                "write the readme file",
                serde_json::json!({}),
                &planner,
                &AlwaysIrreversible,
                TrustLevel::ReportOnly,
                None,
                &EchoExecutor,
            )
            .await
            .unwrap();
        match outcome {
            PipelineOutcome::Completed(result) => assert!(result.all_completed()),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn propose_confirm_suspends_for_irreversible_actions() {
        let log = InMemoryEventLog::new();
        let pipeline = Pipeline::new(&log);
        let planner = FixedPlanner(good_plan());
        let outcome = pipeline
            .run(
                "run-2",
                "write the readme file",
                serde_json::json!({}),
                &planner,
                &AlwaysIrreversible,
                TrustLevel::ProposeConfirm,
                None,
                &EchoExecutor,
            )
            .await
            .unwrap();
        let request_id = match outcome {
            PipelineOutcome::ApprovalRequired { request_id } => request_id,
            other => panic!("expected ApprovalRequired, got {other:?}"),
        };
        assert_eq!(pipeline.pending_approvals().len(), 1);

        let resumed = pipeline.resume_with_approval(&request_id, true, None, &EchoExecutor).await.unwrap();
        match resumed {
            PipelineOutcome::Completed(result) => assert!(result.all_completed()),
            other => panic!("expected Completed, got {other:?}"),
        }
        assert!(pipeline.pending_approvals().is_empty());
    }

    #[tokio::test]
    async fn rejected_approval_short_circuits() {
        let log = InMemoryEventLog::new();
        let pipeline = Pipeline::new(&log);
        let planner = FixedPlanner(good_plan());
        let outcome = pipeline
            .run(
                "run-3",
                "write the readme file",
                serde_json::json!({}),
                &planner,
                &AlwaysIrreversible,
                TrustLevel::ProposeConfirm,
                None,
                &EchoExecutor,
            )
            .await
            .unwrap();
        let request_id = match outcome {
            PipelineOutcome::ApprovalRequired { request_id } => request_id,
            other => panic!("expected ApprovalRequired, got {other:?}"),
        };
        let resumed = pipeline
            .resume_with_approval(&request_id, false, Some("too risky".into()), &EchoExecutor)
            .await
            .unwrap();
        assert!(matches!(resumed, PipelineOutcome::Rejected { reason: Some(r) } if r == "too risky"));
    }

    #[tokio::test]
    async fn guard_failure_blocks_execution() {
        let log = InMemoryEventLog::new();
        let pipeline = Pipeline::new(&log);
        let planner = FixedPlanner(TaskPlan { tasks: vec![], reasoning: String::new(), is_fallback: false });
        let err = pipeline
            .run(
                "run-4",
                "do anything",
                serde_json::json!({}),
                &planner,
                &AlwaysIrreversible,
                TrustLevel::ReportOnly,
                None,
                &EchoExecutor,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailed(_)));
    }
}
