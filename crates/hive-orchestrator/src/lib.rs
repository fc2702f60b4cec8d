//! Task DAG orchestrator: Kahn-layer dependency execution with parallel
//! dispatch within a layer (spec §4.5).
//!
//! Grounded in `toka-orchestration`'s dependency-resolution/workstream
//! coordination split, simplified to the single operation spec §4.5
//! names: given a `TaskPlan`, drive every task to completion respecting
//! `depends_on`, dispatching everything ready within a layer concurrently.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use hive_types::{PlannedTask, TaskPlan, TypesError};
use thiserror::Error;
use tracing::instrument;

/// Errors raised by the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The plan failed pre-flight structural validation (spec §4.5:
    /// "Cycle detection: pre-flight rejects plans whose DAG is not
    /// well-formed").
    #[error("plan is not well-formed: {0}")]
    InvalidPlan(#[from] TypesError),
}

/// Outcome of one task's execution within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Ran and returned a result.
    Completed,
    /// Ran and returned an error.
    Failed,
    /// Never ran because a transitive dependency failed (spec §4.5/§7).
    Skipped,
}

/// Per-task outcome record, keyed by `task_id` in the orchestrator's
/// output map (spec §4.5).
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Final status.
    pub status: TaskStatus,
    /// The task's own output, when `Completed`.
    pub result: Option<serde_json::Value>,
    /// Failure reason, when `Failed` or `Skipped`.
    pub error: Option<String>,
    /// This task's output merged with its ancestors' outputs, as handed
    /// to any task depending on it.
    pub outputs: serde_json::Value,
}

/// Caller-supplied task execution. One implementation might run an LLM
/// worker loop (`hive-worker`); tests typically use a closure-backed stub.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes one task, given its merged dependency outputs as
    /// `context_data`.
    async fn execute(
        &self,
        task_id: &str,
        goal: &str,
        context_data: &serde_json::Value,
    ) -> Result<serde_json::Value, String>;
}

/// Drives a [`TaskPlan`] to completion via Kahn-layer topological
/// dispatch.
pub struct TaskOrchestrator;

impl TaskOrchestrator {
    /// Validates `plan`, computes its dependency layers, and executes
    /// every task through `executor`, returning one [`TaskContext`] per
    /// task id (spec §4.5).
    #[instrument(skip(plan, executor))]
    pub async fn execute_plan(
        plan: &TaskPlan,
        executor: &dyn TaskExecutor,
    ) -> Result<BTreeMap<String, TaskContext>, OrchestratorError> {
        plan.validate_structure()?;
        let layers = kahn_layers(&plan.tasks);

        let by_id: HashMap<&str, &PlannedTask> =
            plan.tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();
        let mut results: BTreeMap<String, TaskContext> = BTreeMap::new();

        for layer in layers {
            let mut handles = Vec::new();
            for task_id in layer {
                let task = by_id[task_id.as_str()];
                let (skip_reason, merged_context) = merge_dependency_outputs(task, &results);
                if let Some(reason) = skip_reason {
                    results.insert(
                        task_id.clone(),
                        TaskContext {
                            status: TaskStatus::Skipped,
                            result: None,
                            error: Some(reason),
                            outputs: serde_json::Value::Null,
                        },
                    );
                    continue;
                }
                let goal = task.goal.clone();
                let fut = executor.execute(&task_id, &goal, &merged_context);
                handles.push(async move { (task_id, fut.await, merged_context) });
            }
            let layer_results = futures::future::join_all(handles).await;
            for (task_id, outcome, merged_context) in layer_results {
                let ctx = match outcome {
                    Ok(value) => TaskContext {
                        status: TaskStatus::Completed,
                        result: Some(value.clone()),
                        error: None,
                        outputs: merge_json(merged_context, value),
                    },
                    Err(e) => TaskContext {
                        status: TaskStatus::Failed,
                        result: None,
                        error: Some(e),
                        outputs: serde_json::Value::Null,
                    },
                };
                results.insert(task_id, ctx);
            }
        }
        Ok(results)
    }
}

/// Determines whether `task` must be skipped (a direct dependency failed
/// or was itself skipped) and, if not, merges the `outputs` of its direct
/// dependencies into the context object handed to the executor.
fn merge_dependency_outputs(
    task: &PlannedTask,
    results: &BTreeMap<String, TaskContext>,
) -> (Option<String>, serde_json::Value) {
    let mut merged = serde_json::Map::new();
    for dep in &task.depends_on {
        match results.get(dep) {
            Some(ctx) if ctx.status == TaskStatus::Completed => {
                merged.insert(dep.clone(), ctx.outputs.clone());
            }
            Some(_) => {
                return (Some("dependency failed".to_string()), serde_json::Value::Null)
            }
            None => {
                // Should not happen after structural validation, but fail
                // safe rather than panic.
                return (
                    Some(format!("dependency {dep} produced no result")),
                    serde_json::Value::Null,
                )
            }
        }
    }
    (None, serde_json::Value::Object(merged))
}

/// Merges a task's own result into its already-merged dependency context,
/// under the key `"self"`, so downstream tasks can distinguish ancestor
/// outputs from the task's own.
fn merge_json(mut context: serde_json::Value, own: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(ref mut map) = context {
        map.insert("self".to_string(), own);
        context
    } else {
        serde_json::json!({ "self": own })
    }
}

/// Computes Kahn topological layers: layer 0 is every task with no
/// dependencies, layer N+1 is every remaining task whose dependencies are
/// all in layers `0..=N`. Assumes `tasks` has already passed
/// [`TaskPlan::validate_structure`] (no cycles, no unresolved references).
fn kahn_layers(tasks: &[PlannedTask]) -> Vec<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for t in tasks {
        indegree.entry(t.task_id.as_str()).or_insert(0);
        for dep in &t.depends_on {
            *indegree.entry(t.task_id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(t.task_id.as_str());
        }
    }

    let mut ready: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut layers = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    while !ready.is_empty() {
        let mut layer: Vec<&str> = ready.drain(..).collect();
        layer.sort_unstable();
        for &id in &layer {
            seen.insert(id);
        }
        let mut next_ready = Vec::new();
        for &id in &layer {
            if let Some(deps) = dependents.get(id) {
                for &dependent in deps {
                    let deg = indegree.get_mut(dependent).expect("tracked above");
                    *deg -= 1;
                    if *deg == 0 {
                        next_ready.push(dependent);
                    }
                }
            }
        }
        layers.push(layer.into_iter().map(str::to_string).collect());
        ready.extend(next_ready);
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

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

    struct FailingExecutor {
        fails: &'static str,
    }

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(
            &self,
            task_id: &str,
            _goal: &str,
            _context_data: &serde_json::Value,
        ) -> Result<serde_json::Value, String> {
            if task_id == self.fails {
                Err("boom".to_string())
            } else {
                Ok(serde_json::json!({ "ran": task_id }))
            }
        }
    }

    fn plan_with_chain() -> TaskPlan {
        TaskPlan {
            tasks: vec![
                PlannedTask { task_id: "a".into(), goal: "do a".into(), depends_on: vec![] },
                PlannedTask { task_id: "b".into(), goal: "do b".into(), depends_on: vec!["a".into()] },
                PlannedTask { task_id: "c".into(), goal: "do c".into(), depends_on: vec!["a".into()] },
                PlannedTask { task_id: "d".into(), goal: "do d".into(), depends_on: vec!["b".into(), "c".into()] },
            ],
            reasoning: String::new(),
            is_fallback: false,
        }
    }

    #[tokio::test]
    async fn happy_path_runs_every_task() {
        let plan = plan_with_chain();
        let results = TaskOrchestrator::execute_plan(&plan, &EchoExecutor).await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.values().all(|c| c.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn failure_propagates_downstream_without_aborting_independent_tasks() {
        let plan = plan_with_chain();
        let exec = FailingExecutor { fails: "b" };
        let results = TaskOrchestrator::execute_plan(&plan, &exec).await.unwrap();
        assert_eq!(results["b"].status, TaskStatus::Failed);
        assert_eq!(results["c"].status, TaskStatus::Completed);
        assert_eq!(results["d"].status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn layer_within_has_no_ordering_but_between_layers_is_strict() {
        let plan = plan_with_chain();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));

        struct RecordingExecutor {
            order: Arc<std::sync::Mutex<Vec<String>>>,
            counter: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl TaskExecutor for RecordingExecutor {
            async fn execute(
                &self,
                task_id: &str,
                _goal: &str,
                _context_data: &serde_json::Value,
            ) -> Result<serde_json::Value, String> {
                self.counter.fetch_add(1, Ordering::SeqCst);
                self.order.lock().unwrap().push(task_id.to_string());
                Ok(serde_json::json!({}))
            }
        }
        let exec = RecordingExecutor { order: order.clone(), counter };
        TaskOrchestrator::execute_plan(&plan, &exec).await.unwrap();
        let seen = order.lock().unwrap().clone();
        // "a" must precede "b" and "c"; "d" must come last.
        let pos = |t: &str| seen.iter().position(|x| x == t).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[tokio::test]
    async fn rejects_malformed_plans_before_dispatch() {
        let plan = TaskPlan {
            tasks: vec![PlannedTask {
                task_id: "a".into(),
                goal: "x".into(),
                depends_on: vec!["ghost".into()],
            }],
            reasoning: String::new(),
            is_fallback: false,
        };
        assert!(TaskOrchestrator::execute_plan(&plan, &EchoExecutor).await.is_err());
    }
}
