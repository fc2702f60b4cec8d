//! Worker runtime: the IDLE/WORKING/ERROR lifecycle plus the ReAct
//! LLM/tool-use loop that drives one task to completion (spec §4.10).
//!
//! Grounded in `colonyforge.worker_bee.worker.Worker` for the lifecycle
//! transitions and event emission, and in `toka-agent-runtime::task`
//! (`TaskExecutor::execute_task_attempt`) for the shape of an
//! LLM-integrated execution loop — generalized here into an explicit
//! ReAct cycle since the source only issued a single completion per
//! attempt, where this pipeline needs iterated tool use.

#![forbid(unsafe_code)]

pub mod tool;

use hive_llm::{LlmGateway, LlmRequest, Message, ToolCall, ToolSchema};
use hive_record::{taxonomy::types as ev, Event, EventLog, RecordError};
use hive_types::WorkerState;
use thiserror::Error;

pub use tool::{Tool, ToolRegistry};

/// Errors raised driving a [`Worker`].
#[derive(Debug, Error)]
pub enum WorkerError {
    /// `receive_task` was called while the worker was not IDLE.
    #[error("worker {0} is not idle")]
    NotIdle(String),
    /// A lifecycle method that requires an assigned task was called
    /// without one (`report_progress`/`complete_task`/`fail_task` on an
    /// IDLE worker).
    #[error("worker {0} has no task assigned")]
    NoTaskAssigned(String),
    /// The event log rejected an append.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Outcome of [`Worker::execute_task_with_llm`].
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The loop produced a final textual answer.
    Completed {
        /// The model's final response text.
        result: String,
        /// Tool calls made along the way, in order.
        deliverables: Vec<ToolCall>,
    },
    /// `max_iterations` elapsed, or tool-use was required and never
    /// materialized within `tool_use_retries`.
    Failed {
        /// Why the loop gave up.
        reason: String,
        /// Whether the caller may retry this task on a fresh worker.
        recoverable: bool,
    },
}

/// Configuration for one [`Worker::execute_task_with_llm`] run (spec §4.10).
#[derive(Debug, Clone)]
pub struct ReActConfig {
    /// Hard cap on LLM round-trips.
    pub max_iterations: u32,
    /// Whether at least one tool call is mandatory before accepting a
    /// text-only response as success.
    pub require_tool_use: bool,
    /// How many retry prompts to send before giving up on
    /// `require_tool_use`.
    pub tool_use_retries: u32,
}

impl Default for ReActConfig {
    fn default() -> Self {
        ReActConfig { max_iterations: 10, require_tool_use: false, tool_use_retries: 2 }
    }
}

/// One worker's lifecycle and task-execution state (spec §4.10).
pub struct Worker<'a> {
    worker_id: String,
    run_id: String,
    state: WorkerState,
    current_task_id: Option<String>,
    progress: u8,
    log: &'a dyn EventLog,
}

impl<'a> Worker<'a> {
    /// Builds an IDLE worker appending audit events to `log`.
    pub fn new(worker_id: impl Into<String>, run_id: impl Into<String>, log: &'a dyn EventLog) -> Self {
        Worker {
            worker_id: worker_id.into(),
            run_id: run_id.into(),
            state: WorkerState::Idle,
            current_task_id: None,
            progress: 0,
            log,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// IDLE → WORKING; emits `worker.started`. The payload carries
    /// `tool_name` (here, the task's goal text doubles as the action
    /// descriptor) and `confirmed` alongside `task_id`/`goal`, since
    /// Sentinel's security scan computes the action class straight off
    /// this event (spec §4.8: "For each `worker.started`, compute the
    /// action class from `tool_name` and payload").
    pub async fn receive_task(&mut self, task_id: impl Into<String>, goal: &str, confirmed: bool) -> Result<(), WorkerError> {
        if self.state != WorkerState::Idle {
            return Err(WorkerError::NotIdle(self.worker_id.clone()));
        }
        let task_id = task_id.into();
        self.append(
            ev::WORKER_STARTED,
            serde_json::json!({ "task_id": task_id, "goal": goal, "tool_name": goal, "confirmed": confirmed }),
        )
        .await?;
        self.state = WorkerState::Working;
        self.current_task_id = Some(task_id);
        self.progress = 0;
        Ok(())
    }

    /// Emits `worker.progress` (spec §4.10).
    pub async fn report_progress(&mut self, percent: u8, message: &str) -> Result<(), WorkerError> {
        let task_id = self.current_task_id.clone().ok_or_else(|| WorkerError::NoTaskAssigned(self.worker_id.clone()))?;
        let percent = percent.min(100);
        self.append(
            ev::WORKER_PROGRESS,
            serde_json::json!({ "task_id": task_id, "percent": percent, "message": message }),
        )
        .await?;
        self.progress = percent;
        Ok(())
    }

    /// Emits `worker.completed` and returns to IDLE (spec §4.10).
    pub async fn complete_task(
        &mut self,
        result: serde_json::Value,
        deliverables: serde_json::Value,
    ) -> Result<(), WorkerError> {
        let task_id = self.current_task_id.clone().ok_or_else(|| WorkerError::NoTaskAssigned(self.worker_id.clone()))?;
        self.append(
            ev::WORKER_COMPLETED,
            serde_json::json!({ "task_id": task_id, "result": result, "deliverables": deliverables }),
        )
        .await?;
        self.state = WorkerState::Idle;
        self.current_task_id = None;
        self.progress = 100;
        Ok(())
    }

    /// Emits `worker.failed`. Returns to IDLE if `recoverable`, else ERROR
    /// (spec §4.10).
    pub async fn fail_task(&mut self, reason: &str, recoverable: bool) -> Result<(), WorkerError> {
        let task_id = self.current_task_id.clone().ok_or_else(|| WorkerError::NoTaskAssigned(self.worker_id.clone()))?;
        self.append(
            ev::WORKER_FAILED,
            serde_json::json!({ "task_id": task_id, "reason": reason, "recoverable": recoverable }),
        )
        .await?;
        self.state = if recoverable { WorkerState::Idle } else { WorkerState::Error };
        self.current_task_id = None;
        Ok(())
    }

    /// Glues `receive_task` → the ReAct loop → `complete_task`/`fail_task`
    /// (spec §4.10).
    pub async fn execute_task_with_llm(
        &mut self,
        task_id: impl Into<String>,
        goal: &str,
        confirmed: bool,
        gateway: &LlmGateway,
        tools: &ToolRegistry,
        config: &ReActConfig,
    ) -> Result<ExecutionOutcome, WorkerError> {
        self.receive_task(task_id, goal, confirmed).await?;

        let outcome = self.react_loop(goal, gateway, tools, config).await;
        match &outcome {
            ExecutionOutcome::Completed { result, deliverables } => {
                self.complete_task(
                    serde_json::json!(result),
                    serde_json::json!(deliverables.iter().map(|c| &c.name).collect::<Vec<_>>()),
                )
                .await?;
            }
            ExecutionOutcome::Failed { reason, recoverable } => {
                self.fail_task(reason, *recoverable).await?;
            }
        }
        Ok(outcome)
    }

    async fn react_loop(
        &self,
        goal: &str,
        gateway: &LlmGateway,
        tools: &ToolRegistry,
        config: &ReActConfig,
    ) -> ExecutionOutcome {
        let mut conversation = vec![Message::user(goal)];
        let schemas: Vec<ToolSchema> = tools.schemas();
        let mut tool_used = false;
        let mut retries_spent = 0u32;
        let mut deliverables = Vec::new();

        for _ in 0..config.max_iterations {
            let request = LlmRequest::new(conversation.clone()).with_tools(schemas.clone());
            let response = match gateway.complete(&self.worker_id, request).await {
                Ok(r) => r,
                Err(e) => return ExecutionOutcome::Failed { reason: e.to_string(), recoverable: true },
            };

            if response.has_tool_calls() {
                for call in &response.tool_calls {
                    deliverables.push(call.clone());
                    let outcome = tools.execute(call).await;
                    let turn = match outcome {
                        Ok(value) => Message::tool_result(&call.id, value.to_string()),
                        Err(e) => Message::tool_result(&call.id, serde_json::json!({ "error": e }).to_string()),
                    };
                    conversation.push(Message {
                        role: "assistant".to_string(),
                        content: response.content.clone(),
                        tool_calls: vec![call.clone()],
                        tool_call_id: None,
                    });
                    conversation.push(turn);
                }
                tool_used = true;
                continue;
            }

            if config.require_tool_use && !tool_used {
                if retries_spent >= config.tool_use_retries {
                    return ExecutionOutcome::Failed {
                        reason: "model never called a required tool".to_string(),
                        recoverable: true,
                    };
                }
                retries_spent += 1;
                conversation.push(Message {
                    role: "assistant".to_string(),
                    content: response.content.clone(),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                });
                conversation.push(Message::user("you must call a tool before answering; try again"));
                continue;
            }

            return ExecutionOutcome::Completed { result: response.content, deliverables };
        }

        ExecutionOutcome::Failed { reason: "exceeded max_iterations".to_string(), recoverable: true }
    }

    async fn append(&self, event_type: &str, payload: serde_json::Value) -> Result<Event, RecordError> {
        let event = Event::new(event_type, &self.run_id, self.worker_id.clone(), payload).with_worker_id(&self.worker_id);
        self.log.append(&self.run_id, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hive_llm::StubProvider;
    use hive_record::InMemoryEventLog;
    use std::sync::Arc;

    #[tokio::test]
    async fn lifecycle_happy_path_emits_started_progress_completed() {
        let log = InMemoryEventLog::new();
        let mut worker = Worker::new("worker-1", "run-1", &log);
        worker.receive_task("t1", "ship it", true).await.unwrap();
        assert_eq!(worker.state(), WorkerState::Working);
        worker.report_progress(50, "halfway").await.unwrap();
        worker.complete_task(serde_json::json!("done"), serde_json::json!([])).await.unwrap();
        assert_eq!(worker.state(), WorkerState::Idle);

        let events = log.replay("run-1", None).await.unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec![ev::WORKER_STARTED, ev::WORKER_PROGRESS, ev::WORKER_COMPLETED]);
    }

    #[tokio::test]
    async fn worker_started_carries_tool_name_and_confirmed_for_sentinel() {
        let log = InMemoryEventLog::new();
        let mut worker = Worker::new("worker-1", "run-1", &log);
        worker.receive_task("t1", "delete stale branches", false).await.unwrap();
        let event = log.get_last_event("run-1").await.unwrap().unwrap();
        assert_eq!(event.payload["tool_name"], "delete stale branches");
        assert_eq!(event.payload["confirmed"], false);
    }

    #[tokio::test]
    async fn receive_task_rejects_non_idle_worker() {
        let log = InMemoryEventLog::new();
        let mut worker = Worker::new("worker-1", "run-1", &log);
        worker.receive_task("t1", "goal", true).await.unwrap();
        let err = worker.receive_task("t2", "other", true).await.unwrap_err();
        assert!(matches!(err, WorkerError::NotIdle(_)));
    }

    #[tokio::test]
    async fn unrecoverable_failure_transitions_to_error() {
        let log = InMemoryEventLog::new();
        let mut worker = Worker::new("worker-1", "run-1", &log);
        worker.receive_task("t1", "goal", true).await.unwrap();
        worker.fail_task("disk on fire", false).await.unwrap();
        assert_eq!(worker.state(), WorkerState::Error);
    }

    #[tokio::test]
    async fn react_loop_completes_without_tools_when_not_required() {
        let log = InMemoryEventLog::new();
        let mut worker = Worker::new("worker-1", "run-1", &log);
        let gateway = LlmGateway::new(Arc::new(StubProvider::echo()), 60);
        let tools = ToolRegistry::new();
        let outcome = worker
            .execute_task_with_llm("t1", "ship it", true, &gateway, &tools, &ReActConfig::default())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Completed { .. }));
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    struct EchoArgsTool;
    #[async_trait]
    impl Tool for EchoArgsTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its arguments back"
        }
        async fn execute(&self, args: &serde_json::Value) -> Result<serde_json::Value, String> {
            Ok(args.clone())
        }
    }

    #[tokio::test]
    async fn react_loop_runs_requested_tool_calls() {
        let log = InMemoryEventLog::new();
        let mut worker = Worker::new("worker-1", "run-1", &log);
        let call = ToolCall { id: "1".to_string(), name: "echo".to_string(), arguments: serde_json::json!({"x": 1}) };
        let gateway = LlmGateway::new(Arc::new(StubProvider::with_tool_call(call)), 60);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoArgsTool));

        // StubProvider::with_tool_call always returns the same tool call, so
        // bound iterations to avoid an infinite loop in this test double.
        let config = ReActConfig { max_iterations: 1, require_tool_use: false, tool_use_retries: 0 };
        let outcome = worker.execute_task_with_llm("t1", "go", true, &gateway, &tools, &config).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Failed { reason, .. } if reason.contains("max_iterations")));
    }
}
