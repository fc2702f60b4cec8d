//! Cross-episode KPI aggregation.
//!
//! Spec §4.12 computes correctness and incident-rate from a single
//! episode's outcome directly, but says repeatability and recurrence
//! "require cross-episode aggregation performed separately" — this is
//! that separate step, grounded in the same `honeycomb` package's
//! `KPIScores`/`GateAccuracyMetrics` fields (the dashboard those feed
//! stays out of scope).

use std::collections::{BTreeMap, HashMap};

use hive_types::{Episode, Outcome};

/// KPI figures computed over a population of episodes rather than one.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateKpis {
    /// Episodes the aggregate was computed over.
    pub episode_count: usize,
    /// Mean of `kpi_scores["correctness"]` across episodes that have it.
    pub mean_correctness: f64,
    /// Mean of `kpi_scores["lead_time_seconds"]` across episodes that have it.
    pub mean_lead_time_seconds: f64,
    /// Among goals attempted more than once, the mean fraction of attempts
    /// that succeeded — how reliably the same goal converges on success
    /// across retries.
    pub repeatability: f64,
    /// Among non-success episodes that have a parent, the fraction whose
    /// failure class matches a parent's — how often a "fix" reproduces the
    /// same failure instead of a new one.
    pub recurrence_rate: f64,
}

/// Aggregates `episodes`. Returns `episode_count: 0` and all-zero figures
/// for an empty slice rather than erroring — an empty population is a
/// valid (if uninformative) answer, not a caller mistake.
pub fn aggregate_kpis(episodes: &[Episode]) -> AggregateKpis {
    if episodes.is_empty() {
        return AggregateKpis {
            episode_count: 0,
            mean_correctness: 0.0,
            mean_lead_time_seconds: 0.0,
            repeatability: 0.0,
            recurrence_rate: 0.0,
        };
    }

    AggregateKpis {
        episode_count: episodes.len(),
        mean_correctness: mean_of(episodes, "correctness"),
        mean_lead_time_seconds: mean_of(episodes, "lead_time_seconds"),
        repeatability: repeatability(episodes),
        recurrence_rate: recurrence_rate(episodes),
    }
}

fn mean_of(episodes: &[Episode], key: &str) -> f64 {
    let values: Vec<f64> = episodes.iter().filter_map(|e| e.kpi_scores.get(key).copied()).collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn repeatability(episodes: &[Episode]) -> f64 {
    let mut by_goal: HashMap<&str, Vec<Outcome>> = HashMap::new();
    for e in episodes {
        by_goal.entry(e.goal.as_str()).or_default().push(e.outcome);
    }

    let ratios: Vec<f64> = by_goal
        .values()
        .filter(|outcomes| outcomes.len() > 1)
        .map(|outcomes| {
            let successes = outcomes.iter().filter(|o| **o == Outcome::Success).count();
            successes as f64 / outcomes.len() as f64
        })
        .collect();

    if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    }
}

fn recurrence_rate(episodes: &[Episode]) -> f64 {
    let by_id: BTreeMap<String, &Episode> = episodes.iter().map(|e| (e.episode_id.to_string(), e)).collect();

    let mut eligible = 0u32;
    let mut recurring = 0u32;

    for e in episodes {
        if e.outcome == Outcome::Success {
            continue;
        }
        let parent_classes: Vec<_> =
            e.parent_episode_ids.iter().filter_map(|id| by_id.get(id)).filter_map(|p| p.failure_class).collect();
        if parent_classes.is_empty() {
            continue;
        }
        eligible += 1;
        if let Some(class) = e.failure_class {
            if parent_classes.contains(&class) {
                recurring += 1;
            }
        }
    }

    if eligible == 0 {
        0.0
    } else {
        recurring as f64 / eligible as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::{new_event_id, FailureClass};
    use std::collections::BTreeMap;

    fn episode(goal: &str, outcome: Outcome, failure_class: Option<FailureClass>, parents: Vec<String>) -> Episode {
        let mut kpi_scores = BTreeMap::new();
        kpi_scores.insert("correctness".to_string(), if outcome == Outcome::Success { 1.0 } else { 0.0 });
        Episode {
            episode_id: new_event_id(),
            run_id: "run".to_string(),
            colony_id: None,
            goal: goal.to_string(),
            outcome,
            duration_secs: 1.0,
            token_count: 0,
            failure_class,
            sentinel_intervention_count: 0,
            kpi_scores,
            parent_episode_ids: parents,
            template_used: None,
            task_features: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_population_aggregates_to_zero_not_an_error() {
        let agg = aggregate_kpis(&[]);
        assert_eq!(agg.episode_count, 0);
        assert_eq!(agg.repeatability, 0.0);
    }

    #[test]
    fn repeatability_averages_success_ratio_across_retried_goals() {
        let a = episode("fix the bug", Outcome::Failure, Some(FailureClass::Implementation), vec![]);
        let b = episode("fix the bug", Outcome::Success, None, vec![a.episode_id.to_string()]);
        let solo = episode("unrelated goal", Outcome::Success, None, vec![]);

        let agg = aggregate_kpis(&[a, b, solo]);
        assert_eq!(agg.repeatability, 0.5);
    }

    #[test]
    fn recurrence_rate_flags_a_failure_matching_its_parents_class() {
        let parent = episode("fix the bug", Outcome::Failure, Some(FailureClass::Timeout), vec![]);
        let child =
            episode("fix the bug", Outcome::Failure, Some(FailureClass::Timeout), vec![parent.episode_id.to_string()]);
        let unrelated_child =
            episode("fix the bug", Outcome::Failure, Some(FailureClass::Design), vec![parent.episode_id.to_string()]);

        let agg = aggregate_kpis(&[parent, child, unrelated_child]);
        assert_eq!(agg.recurrence_rate, 0.5);
    }
}
