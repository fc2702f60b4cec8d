//! CLI-local [`hive_pipeline::Planner`] and [`hive_orchestrator::TaskExecutor`]
//! implementations, standing in for the LLM-backed planner and the
//! worker-pool dispatcher a real deployment would wire in instead.

use std::sync::Arc;

use async_trait::async_trait;
use hive_llm::LlmGateway;
use hive_orchestrator::TaskExecutor;
use hive_pipeline::Planner;
use hive_record::EventLog;
use hive_types::TaskPlan;
use hive_worker::{ExecutionOutcome, ReActConfig, ToolRegistry, Worker};

/// Always proposes the single-task fallback plan (spec §4.6, design note
/// iii). A real planner would call an LLM to decompose `goal`; choosing a
/// model backend is explicitly out of scope here.
pub struct SingleTaskPlanner;

#[async_trait]
impl Planner for SingleTaskPlanner {
    async fn propose_plan(&self, goal: &str, _context: &serde_json::Value) -> TaskPlan {
        TaskPlan::fallback(goal)
    }
}

/// Runs each task through a fresh [`Worker`]'s ReAct loop.
pub struct WorkerExecutor<'a> {
    pub log: &'a dyn EventLog,
    pub run_id: String,
    pub gateway: Arc<LlmGateway>,
    pub tools: Arc<ToolRegistry>,
    pub config: ReActConfig,
}

#[async_trait]
impl<'a> TaskExecutor for WorkerExecutor<'a> {
    async fn execute(&self, task_id: &str, goal: &str, context_data: &serde_json::Value) -> Result<serde_json::Value, String> {
        let confirmed = context_data.get("confirmed").and_then(|v| v.as_bool()).unwrap_or(false);
        let mut worker = Worker::new(task_id.to_string(), self.run_id.clone(), self.log);
        let outcome = worker
            .execute_task_with_llm(task_id, goal, confirmed, &self.gateway, &self.tools, &self.config)
            .await
            .map_err(|e| e.to_string())?;

        match outcome {
            ExecutionOutcome::Completed { result, deliverables } => {
                Ok(serde_json::json!({ "result": result, "tool_calls": deliverables }))
            }
            ExecutionOutcome::Failed { reason, .. } => Err(reason),
        }
    }
}
