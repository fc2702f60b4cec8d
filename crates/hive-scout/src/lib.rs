//! Scout: recommends a Colony template from past Episodes (spec §4.11).
//!
//! Grounded in `colonyforge.scout_bee.{scout,matcher,analyzer,models}`:
//! cold-start below a minimum episode count, else Euclidean-distance
//! similarity search over a fixed feature set, per-template success/speed
//! stats over the similar episodes, and a reason string explaining the
//! recommendation.

#![forbid(unsafe_code)]

pub mod referee;

use std::collections::BTreeMap;

use hive_types::{Episode, Outcome};
use serde::{Deserialize, Serialize};

/// Feature keys Scout's similarity search compares (spec §4.11); any
/// other keys present on a task's feature vector are ignored.
pub const FEATURE_KEYS: &[&str] = &["complexity", "risk", "urgency"];

const FEATURE_MIN: f64 = 1.0;
const FEATURE_MAX: f64 = 5.0;
const FEATURE_DEFAULT: f64 = 3.0;

/// Template recommended when there isn't yet enough history to reason
/// about similarity at all.
pub const DEFAULT_TEMPLATE: &str = "balanced";

/// Tunables for a `recommend` call.
#[derive(Debug, Clone)]
pub struct ScoutConfig {
    /// Fewer episodes than this and Scout doesn't even attempt a
    /// similarity search — it's cold-start territory.
    pub min_episodes: usize,
    /// Maximum number of similar episodes fed into template analysis.
    pub top_k: usize,
    /// Episodes below this similarity score are excluded from analysis.
    pub min_similarity: f64,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        ScoutConfig { min_episodes: 5, top_k: 10, min_similarity: 0.3 }
    }
}

/// Coarse verdict a Scout recommendation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoutVerdict {
    /// A template is recommended from similar past episodes.
    Recommended,
    /// Too little history to search at all; falls back to [`DEFAULT_TEMPLATE`].
    ColdStart,
    /// There was history, but nothing similar enough to the target task.
    InsufficientData,
}

/// Per-template outcome statistics over a set of episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStats {
    /// Template these stats describe.
    pub template_name: String,
    /// Episodes that used this template.
    pub total_count: u32,
    /// Of those, how many succeeded.
    pub success_count: u32,
    /// `success_count / total_count`, or 0.0 when `total_count` is 0.
    pub success_rate: f64,
    /// Mean duration over episodes with a positive recorded duration
    /// (episodes with no timing data don't drag the average to zero).
    pub avg_duration_seconds: f64,
}

/// A concrete suggestion: switch to (or stay with) a template, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationProposal {
    /// The recommended template.
    pub template_name: String,
    /// Its success rate among the similar episodes considered.
    pub success_rate: f64,
    /// Its average duration among the similar episodes considered.
    pub avg_duration_seconds: f64,
    /// Human-readable justification.
    pub reason: String,
    /// How many similar episodes informed this proposal.
    pub similar_episode_count: u32,
}

/// Full result of a `recommend` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutReport {
    /// Which branch of the recommendation logic fired.
    pub verdict: ScoutVerdict,
    /// The template to use, regardless of verdict.
    pub recommended_template: String,
    /// Count of episodes judged similar enough to inform this report.
    pub similar_count: u32,
    /// Present only for [`ScoutVerdict::Recommended`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<OptimizationProposal>,
    /// Per-template stats computed over the similar episodes.
    #[serde(default)]
    pub template_stats: BTreeMap<String, TemplateStats>,
}

/// One past episode paired with its similarity to the target task.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarEpisode {
    /// The episode.
    pub episode: Episode,
    /// Similarity in `[0.0, 1.0]`; 1.0 is an exact feature match.
    pub similarity: f64,
}

/// Euclidean distance over [`FEATURE_KEYS`], normalized to `[0, 1]` and
/// inverted so higher means more similar. A feature missing from either
/// side falls back to the midpoint of its valid range rather than being
/// dropped, so a partially-described task still compares sensibly.
fn similarity(target: &BTreeMap<String, f64>, candidate: &BTreeMap<String, f64>) -> f64 {
    let feature = |features: &BTreeMap<String, f64>, key: &str| *features.get(key).unwrap_or(&FEATURE_DEFAULT);

    let squared_sum: f64 = FEATURE_KEYS
        .iter()
        .map(|key| {
            let t = feature(target, key);
            let c = feature(candidate, key);
            (t - c).powi(2)
        })
        .sum();
    let distance = squared_sum.sqrt();
    let max_distance = (FEATURE_MAX - FEATURE_MIN) * (FEATURE_KEYS.len() as f64).sqrt();

    if max_distance == 0.0 {
        1.0
    } else {
        (1.0 - distance / max_distance).max(0.0)
    }
}

/// Ranks `episodes` by similarity to `target`, keeping only those at or
/// above `min_similarity`, highest first, truncated to `top_k`.
pub fn find_similar(
    target: &BTreeMap<String, f64>,
    episodes: &[Episode],
    top_k: usize,
    min_similarity: f64,
) -> Vec<SimilarEpisode> {
    let mut scored: Vec<SimilarEpisode> = episodes
        .iter()
        .map(|e| SimilarEpisode { episode: e.clone(), similarity: similarity(target, &e.task_features) })
        .filter(|s| s.similarity >= min_similarity)
        .collect();

    scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

fn template_name_of(episode: &Episode) -> String {
    episode.template_used.clone().unwrap_or_else(|| DEFAULT_TEMPLATE.to_string())
}

/// Groups `episodes` by template and computes per-template stats. Empty
/// input yields an empty map, not an error.
pub fn analyze(episodes: &[SimilarEpisode]) -> BTreeMap<String, TemplateStats> {
    let mut groups: BTreeMap<String, Vec<&Episode>> = BTreeMap::new();
    for s in episodes {
        groups.entry(template_name_of(&s.episode)).or_default().push(&s.episode);
    }

    groups
        .into_iter()
        .map(|(template_name, group)| {
            let total_count = group.len() as u32;
            let success_count = group.iter().filter(|e| e.outcome == Outcome::Success).count() as u32;
            let durations: Vec<f64> = group.iter().map(|e| e.duration_secs).filter(|d| *d > 0.0).collect();
            let avg_duration_seconds =
                if durations.is_empty() { 0.0 } else { durations.iter().sum::<f64>() / durations.len() as f64 };

            (
                template_name.clone(),
                TemplateStats {
                    template_name,
                    total_count,
                    success_count,
                    success_rate: if total_count > 0 { success_count as f64 / total_count as f64 } else { 0.0 },
                    avg_duration_seconds,
                },
            )
        })
        .collect()
}

/// The best template among `stats`: highest success rate, ties broken by
/// the faster average duration. `None` for an empty map.
fn best_template(stats: &BTreeMap<String, TemplateStats>) -> Option<String> {
    stats
        .values()
        .max_by(|a, b| {
            a.success_rate
                .partial_cmp(&b.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.avg_duration_seconds.partial_cmp(&a.avg_duration_seconds).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|s| s.template_name.clone())
}

fn build_reason(stats: &TemplateStats, similar_count: usize) -> String {
    format!(
        "'{}' succeeded in {}/{} of the {} most similar past episodes (avg duration {:.1}s)",
        stats.template_name, stats.success_count, stats.total_count, similar_count, stats.avg_duration_seconds
    )
}

/// Recommends a template for a task described by `target_features`,
/// informed by `episodes` (the full episode history Scout has access to).
pub fn recommend(target_features: &BTreeMap<String, f64>, episodes: &[Episode], config: &ScoutConfig) -> ScoutReport {
    if episodes.len() < config.min_episodes {
        return ScoutReport {
            verdict: ScoutVerdict::ColdStart,
            recommended_template: DEFAULT_TEMPLATE.to_string(),
            similar_count: 0,
            proposal: None,
            template_stats: BTreeMap::new(),
        };
    }

    let similar = find_similar(target_features, episodes, config.top_k, config.min_similarity);
    if similar.is_empty() {
        return ScoutReport {
            verdict: ScoutVerdict::InsufficientData,
            recommended_template: DEFAULT_TEMPLATE.to_string(),
            similar_count: 0,
            proposal: None,
            template_stats: BTreeMap::new(),
        };
    }

    let template_stats = analyze(&similar);
    let chosen = best_template(&template_stats).unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
    let stats = template_stats.get(&chosen).cloned().unwrap_or(TemplateStats {
        template_name: chosen.clone(),
        total_count: 0,
        success_count: 0,
        success_rate: 0.0,
        avg_duration_seconds: 0.0,
    });

    let proposal = OptimizationProposal {
        template_name: chosen.clone(),
        success_rate: stats.success_rate,
        avg_duration_seconds: stats.avg_duration_seconds,
        reason: build_reason(&stats, similar.len()),
        similar_episode_count: similar.len() as u32,
    };

    ScoutReport {
        verdict: ScoutVerdict::Recommended,
        recommended_template: chosen,
        similar_count: similar.len() as u32,
        proposal: Some(proposal),
        template_stats,
    }
}
