//! Episode recorder and cross-episode KPI aggregation (spec §4.12).
//!
//! Grounded in `colonyforge.core.honeycomb.recorder.EpisodeRecorder`:
//! replays a run's event stream once and derives outcome, duration,
//! failure classification, token count and Sentinel-intervention count
//! from it, then folds those into a single-episode KPI estimate.
//! `event_counters.py`'s per-event-type tally is the basis for
//! [`GateAccuracyMetrics`], and the closing note in spec §4.12 — that
//! repeatability and recurrence need aggregation across episodes, not
//! just one — is the basis for the [`kpi`] module.

#![forbid(unsafe_code)]

pub mod kpi;

use std::collections::BTreeMap;
use std::sync::Arc;

use hive_record::{taxonomy::types as ev, Event, EventLog, RecordError};
use hive_types::{new_event_id, Episode, FailureClass, Outcome};
use tokio::sync::RwLock;

/// Errors recording or retrieving episodes.
#[derive(Debug, thiserror::Error)]
pub enum HoneycombError {
    /// The underlying event log failed.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Event types counted as a Sentinel intervention against a run, as
/// opposed to a routine status report (spec §4.12: "ALERT_RAISED,
/// ROLLBACK, QUARANTINE, KPI_DEGRADATION, EMERGENCY_STOP — but not
/// routine reports"). This workspace's Sentinel only raises
/// `sentinel.alert_raised` and the global `system.emergency_stop`; it has
/// no separate rollback/quarantine event types, so those two cover the
/// full taxonomy it can produce.
const SENTINEL_INTERVENTION_TYPES: &[&str] = &[ev::SENTINEL_ALERT_RAISED, ev::SYSTEM_EMERGENCY_STOP];

/// Replays `run_id`'s stream and records the resulting [`Episode`].
///
/// `goal`, `colony_id`, `template_used`, `task_features` and
/// `parent_episode_ids` describe context the event stream itself doesn't
/// carry (or carries inconsistently); callers pass through whatever their
/// orchestration layer already knows about the run.
pub async fn record_run_episode(
    log: &dyn EventLog,
    run_id: &str,
    colony_id: Option<String>,
    goal: impl Into<String>,
    template_used: Option<String>,
    task_features: BTreeMap<String, f64>,
    parent_episode_ids: Vec<String>,
) -> Result<Episode, HoneycombError> {
    let events = log.replay(run_id, None).await?;

    let outcome = determine_outcome(&events);
    let duration_secs = calculate_duration(&events);
    let failure_class = if outcome == Outcome::Success { None } else { classify_failure(&events) };
    let token_count = count_tokens(&events);
    let sentinel_intervention_count = count_sentinel_interventions(&events);
    let kpi_scores = calculate_kpi_scores(outcome, duration_secs);

    Ok(Episode {
        episode_id: new_event_id(),
        run_id: run_id.to_string(),
        colony_id,
        goal: goal.into(),
        outcome,
        duration_secs,
        token_count,
        failure_class,
        sentinel_intervention_count,
        kpi_scores,
        parent_episode_ids,
        template_used,
        task_features,
        metadata: BTreeMap::new(),
    })
}

/// SUCCESS if the run completed cleanly; PARTIAL if it completed with a
/// mix of task outcomes or ended without a terminal run event at all
/// (an in-flight run observed mid-stream); FAILURE if it failed or was
/// aborted outright with no successful tasks.
fn determine_outcome(events: &[Event]) -> Outcome {
    let has = |t: &str| events.iter().any(|e| e.event_type == t);

    if has(ev::RUN_COMPLETED) {
        return Outcome::Success;
    }
    if has(ev::RUN_FAILED) {
        let completed = events.iter().filter(|e| e.event_type == ev::TASK_COMPLETED).count();
        let failed = events.iter().filter(|e| e.event_type == ev::TASK_FAILED).count();
        return if completed > 0 && failed > 0 { Outcome::Partial } else { Outcome::Failure };
    }
    if has(ev::RUN_ABORTED) {
        return Outcome::Failure;
    }
    Outcome::Partial
}

/// Seconds between the first and last event's timestamp; zero for a
/// stream with fewer than two events.
fn calculate_duration(events: &[Event]) -> f64 {
    if events.len() < 2 {
        return 0.0;
    }
    let first = events.first().unwrap().timestamp;
    let last = events.last().unwrap().timestamp;
    (last - first).num_milliseconds().max(0) as f64 / 1000.0
}

/// Keyword-maps the last failure event's `reason` payload field, walking
/// from the end of the stream (spec §4.12).
fn classify_failure(events: &[Event]) -> Option<FailureClass> {
    let last_failure =
        events.iter().rev().find(|e| e.event_type == ev::TASK_FAILED || e.event_type == ev::RUN_FAILED)?;

    let reason = last_failure.payload.get("reason").and_then(|v| v.as_str()).unwrap_or("").to_lowercase();

    Some(if reason.contains("timeout") || reason.contains("time") {
        FailureClass::Timeout
    } else if reason.contains("connect") || reason.contains("network") || reason.contains("environment") {
        FailureClass::Environment
    } else if reason.contains("integration") || reason.contains("merge") {
        FailureClass::Integration
    } else if reason.contains("compile") || reason.contains("syntax") || reason.contains("import") {
        FailureClass::Implementation
    } else if reason.contains("design") || reason.contains("architecture") {
        FailureClass::Design
    } else if reason.contains("spec") || reason.contains("requirement") || reason.contains("ambiguous") {
        FailureClass::Specification
    } else {
        FailureClass::Implementation
    })
}

fn count_tokens(events: &[Event]) -> u64 {
    events
        .iter()
        .filter(|e| e.event_type == ev::WORKER_COMPLETED || e.event_type == ev::WORKER_PROGRESS)
        .filter_map(|e| e.payload.get("token_count").or_else(|| e.payload.get("tokens_used")))
        .filter_map(|v| v.as_u64())
        .sum()
}

fn count_sentinel_interventions(events: &[Event]) -> u32 {
    events.iter().filter(|e| SENTINEL_INTERVENTION_TYPES.contains(&e.event_type.as_str())).count() as u32
}

/// correctness and incident_rate follow directly from `outcome`;
/// lead_time_seconds is the run's wall-clock duration. repeatability and
/// recurrence_rate are left out of a single episode's scores — they need
/// [`kpi::aggregate_kpis`] over a population.
fn calculate_kpi_scores(outcome: Outcome, duration_secs: f64) -> BTreeMap<String, f64> {
    let mut scores = BTreeMap::new();
    scores.insert(
        "correctness".to_string(),
        match outcome {
            Outcome::Success => 1.0,
            Outcome::Partial => 0.5,
            Outcome::Failure => 0.0,
        },
    );
    scores.insert("incident_rate".to_string(), if outcome == Outcome::Success { 0.0 } else { 1.0 });
    if duration_secs > 0.0 {
        scores.insert("lead_time_seconds".to_string(), duration_secs);
    }
    scores
}

/// Append-only store of recorded episodes, kept in memory. Mirrors
/// [`hive_record::InMemoryEventLog`]'s role: good enough to drive Scout
/// and the rest of the workspace's tests without a filesystem.
#[derive(Clone, Default)]
pub struct InMemoryEpisodeStore {
    episodes: Arc<RwLock<Vec<Episode>>>,
}

impl InMemoryEpisodeStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `episode`.
    pub async fn append(&self, episode: Episode) {
        self.episodes.write().await.push(episode);
    }

    /// All recorded episodes, oldest first.
    pub async fn all(&self) -> Vec<Episode> {
        self.episodes.read().await.clone()
    }

    /// Episodes recorded for a given colony.
    pub async fn by_colony(&self, colony_id: &str) -> Vec<Episode> {
        self.episodes.read().await.iter().filter(|e| e.colony_id.as_deref() == Some(colony_id)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_record::InMemoryEventLog;
    use serde_json::json;

    async fn log_with(events: Vec<(&str, serde_json::Value)>) -> InMemoryEventLog {
        let log = InMemoryEventLog::new();
        for (event_type, payload) in events {
            log.append("run-1", Event::new(event_type, "run-1", "system", payload)).await.unwrap();
        }
        log
    }

    #[tokio::test]
    async fn successful_run_produces_success_outcome_and_full_correctness() {
        let log = log_with(vec![
            (ev::RUN_STARTED, json!({})),
            (ev::TASK_COMPLETED, json!({})),
            (ev::RUN_COMPLETED, json!({})),
        ])
        .await;

        let episode = record_run_episode(&log, "run-1", None, "ship it", None, BTreeMap::new(), vec![])
            .await
            .unwrap();

        assert_eq!(episode.outcome, Outcome::Success);
        assert_eq!(episode.failure_class, None);
        assert_eq!(episode.kpi_scores["correctness"], 1.0);
        assert_eq!(episode.kpi_scores["incident_rate"], 0.0);
    }

    #[tokio::test]
    async fn mixed_task_results_under_a_run_failure_are_partial() {
        let log = log_with(vec![
            (ev::TASK_COMPLETED, json!({})),
            (ev::TASK_FAILED, json!({"reason": "compile error in module"})),
            (ev::RUN_FAILED, json!({})),
        ])
        .await;

        let episode = record_run_episode(&log, "run-1", None, "ship it", None, BTreeMap::new(), vec![])
            .await
            .unwrap();

        assert_eq!(episode.outcome, Outcome::Partial);
        assert_eq!(episode.failure_class, Some(FailureClass::Implementation));
    }

    #[tokio::test]
    async fn failure_reason_keywords_map_to_failure_classes() {
        let log = log_with(vec![(ev::RUN_FAILED, json!({"reason": "connection timeout to sandbox"}))]).await;

        let episode = record_run_episode(&log, "run-1", None, "ship it", None, BTreeMap::new(), vec![])
            .await
            .unwrap();

        assert_eq!(episode.outcome, Outcome::Failure);
        assert_eq!(episode.failure_class, Some(FailureClass::Timeout));
    }

    #[tokio::test]
    async fn sentinel_alerts_count_as_interventions_unconditionally() {
        let log = log_with(vec![
            (ev::SENTINEL_ALERT_RAISED, json!({})),
            (ev::SENTINEL_ALERT_RAISED, json!({})),
            (ev::RUN_COMPLETED, json!({})),
        ])
        .await;

        let episode = record_run_episode(&log, "run-1", None, "ship it", None, BTreeMap::new(), vec![])
            .await
            .unwrap();

        assert_eq!(episode.sentinel_intervention_count, 2);
    }

    #[tokio::test]
    async fn worker_completed_payload_feeds_token_count() {
        let log = log_with(vec![
            (ev::WORKER_COMPLETED, json!({"token_count": 150})),
            (ev::WORKER_PROGRESS, json!({"tokens_used": 40})),
            (ev::RUN_COMPLETED, json!({})),
        ])
        .await;

        let episode = record_run_episode(&log, "run-1", None, "ship it", None, BTreeMap::new(), vec![])
            .await
            .unwrap();

        assert_eq!(episode.token_count, 190);
    }

    #[tokio::test]
    async fn store_round_trips_and_filters_by_colony() {
        let store = InMemoryEpisodeStore::new();
        let mut e1 = Episode {
            episode_id: new_event_id(),
            run_id: "run-1".to_string(),
            colony_id: Some("colony-a".to_string()),
            goal: "x".to_string(),
            outcome: Outcome::Success,
            duration_secs: 1.0,
            token_count: 0,
            failure_class: None,
            sentinel_intervention_count: 0,
            kpi_scores: BTreeMap::new(),
            parent_episode_ids: vec![],
            template_used: None,
            task_features: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        store.append(e1.clone()).await;
        e1.colony_id = Some("colony-b".to_string());
        store.append(e1).await;

        assert_eq!(store.all().await.len(), 2);
        assert_eq!(store.by_colony("colony-a").await.len(), 1);
    }
}
