//! Referee: multi-dimensional scoring and tournament selection over a set
//! of candidate solutions (spec §4.11 — "N candidates scored across
//! several axes; only the surviving top candidates reach Guard").
//!
//! The original system names this stage's types (`CandidateScore`,
//! `DiffResult`, `RefereeReport`, `RefereeVerdict`, `ScoreWeights`,
//! `ScoringDimension`, `SelectionResult`) in a test module whose
//! implementation never made it into the retrieved source, so the scoring
//! and tournament logic below is built from spec prose rather than a
//! ported original — the weighted-dimension formula and the pairwise
//! consistency check are this workspace's design, not a translation.

use serde::{Deserialize, Serialize};

/// One axis a candidate is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringDimension {
    Correctness,
    Robustness,
    Consistency,
    Security,
    Latency,
}

/// Relative weight of each [`ScoringDimension`] in the combined score
/// (spec §4.11: correctness 0.40, robustness 0.20, consistency 0.20,
/// security 0.10, latency 0.10).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub correctness: f64,
    pub robustness: f64,
    pub consistency: f64,
    pub security: f64,
    pub latency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights { correctness: 0.40, robustness: 0.20, consistency: 0.20, security: 0.10, latency: 0.10 }
    }
}

/// A candidate solution, as judged independently on every dimension
/// except consistency (which the tournament derives from pairwise
/// comparison against the other candidates in the same round).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInput {
    /// Identifies this candidate within the round (e.g. a draft id).
    pub candidate_id: String,
    /// In `[0, 1]`: does it do what was asked.
    pub correctness: f64,
    /// In `[0, 1]`: does it handle edge cases and failure modes.
    pub robustness: f64,
    /// In `[0, 1]`: absence of policy/security violations.
    pub security: f64,
    /// In `[0, 1]`: normalized speed (1.0 = fastest candidate in the round).
    pub latency: f64,
    /// The candidate's actual output, compared pairwise for consistency.
    pub output: String,
}

/// A per-dimension score for one candidate plus its weighted total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub candidate_id: String,
    pub correctness: f64,
    pub robustness: f64,
    pub consistency: f64,
    pub security: f64,
    pub latency: f64,
    pub weighted_total: f64,
}

/// Pairwise comparison of two candidates' outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub candidate_a: String,
    pub candidate_b: String,
    /// Token-overlap (Jaccard) similarity of the two outputs, in `[0, 1]`.
    pub agreement: f64,
}

/// Which branch of the tournament produced a [`RefereeReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefereeVerdict {
    /// A normal tournament ran and selected the top candidates.
    Selected,
    /// Exactly one candidate was submitted; it passes without a
    /// tournament (nothing to compare it against).
    SinglePass,
    /// No candidates were submitted at all.
    NoCandidate,
}

/// The winning candidate ids and the verdict that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub verdict: RefereeVerdict,
    pub winners: Vec<String>,
}

/// Full output of a tournament round: the selection plus the scoring and
/// diffing that produced it, for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefereeReport {
    pub selection: SelectionResult,
    pub scores: Vec<CandidateScore>,
    pub diffs: Vec<DiffResult>,
}

fn tokenize(text: &str) -> std::collections::BTreeSet<&str> {
    text.split_whitespace().collect()
}

/// Jaccard similarity of the two outputs' whitespace-tokenized word sets;
/// two empty outputs are trivially identical.
fn agreement(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Runs every pairwise comparison among `candidates`.
fn pairwise_diffs(candidates: &[CandidateInput]) -> Vec<DiffResult> {
    let mut diffs = Vec::new();
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            diffs.push(DiffResult {
                candidate_a: candidates[i].candidate_id.clone(),
                candidate_b: candidates[j].candidate_id.clone(),
                agreement: agreement(&candidates[i].output, &candidates[j].output),
            });
        }
    }
    diffs
}

/// Mean agreement of `candidate_id` against every other candidate; 1.0
/// when there's nothing to compare it to (a lone survivor is trivially
/// self-consistent).
fn consistency_of(candidate_id: &str, diffs: &[DiffResult]) -> f64 {
    let relevant: Vec<f64> = diffs
        .iter()
        .filter(|d| d.candidate_a == candidate_id || d.candidate_b == candidate_id)
        .map(|d| d.agreement)
        .collect();
    if relevant.is_empty() {
        1.0
    } else {
        relevant.iter().sum::<f64>() / relevant.len() as f64
    }
}

fn score(candidate: &CandidateInput, consistency: f64, weights: &ScoreWeights) -> CandidateScore {
    let weighted_total = weights.correctness * candidate.correctness
        + weights.robustness * candidate.robustness
        + weights.consistency * consistency
        + weights.security * candidate.security
        + weights.latency * candidate.latency;

    CandidateScore {
        candidate_id: candidate.candidate_id.clone(),
        correctness: candidate.correctness,
        robustness: candidate.robustness,
        consistency,
        security: candidate.security,
        latency: candidate.latency,
        weighted_total,
    }
}

/// Scores every candidate, then keeps the `top_k` highest weighted totals.
/// `candidates.is_empty()` yields [`RefereeVerdict::NoCandidate`]; a
/// single candidate yields [`RefereeVerdict::SinglePass`] without
/// computing pairwise diffs (there's no second candidate to diff against).
pub fn run_tournament(candidates: &[CandidateInput], weights: &ScoreWeights, top_k: usize) -> RefereeReport {
    if candidates.is_empty() {
        return RefereeReport {
            selection: SelectionResult { verdict: RefereeVerdict::NoCandidate, winners: vec![] },
            scores: vec![],
            diffs: vec![],
        };
    }

    if candidates.len() == 1 {
        let only = &candidates[0];
        let candidate_score = score(only, 1.0, weights);
        return RefereeReport {
            selection: SelectionResult { verdict: RefereeVerdict::SinglePass, winners: vec![only.candidate_id.clone()] },
            scores: vec![candidate_score],
            diffs: vec![],
        };
    }

    let diffs = pairwise_diffs(candidates);
    let mut scores: Vec<CandidateScore> =
        candidates.iter().map(|c| score(c, consistency_of(&c.candidate_id, &diffs), weights)).collect();
    scores.sort_by(|a, b| b.weighted_total.partial_cmp(&a.weighted_total).unwrap_or(std::cmp::Ordering::Equal));

    let winners = scores.iter().take(top_k.max(1)).map(|s| s.candidate_id.clone()).collect();

    RefereeReport { selection: SelectionResult { verdict: RefereeVerdict::Selected, winners }, scores, diffs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, correctness: f64, output: &str) -> CandidateInput {
        CandidateInput {
            candidate_id: id.to_string(),
            correctness,
            robustness: 0.8,
            security: 1.0,
            latency: 0.5,
            output: output.to_string(),
        }
    }

    #[test]
    fn no_candidates_is_no_candidate_verdict() {
        let report = run_tournament(&[], &ScoreWeights::default(), 3);
        assert_eq!(report.selection.verdict, RefereeVerdict::NoCandidate);
        assert!(report.selection.winners.is_empty());
    }

    #[test]
    fn single_candidate_passes_without_a_tournament() {
        let candidates = vec![candidate("a", 0.9, "do the thing")];
        let report = run_tournament(&candidates, &ScoreWeights::default(), 3);
        assert_eq!(report.selection.verdict, RefereeVerdict::SinglePass);
        assert_eq!(report.selection.winners, vec!["a".to_string()]);
        assert!(report.diffs.is_empty());
        assert_eq!(report.scores[0].consistency, 1.0);
    }

    #[test]
    fn higher_correctness_wins_the_tournament() {
        let candidates = vec![
            candidate("weak", 0.2, "return None"),
            candidate("strong", 0.95, "return the computed value"),
        ];
        let report = run_tournament(&candidates, &ScoreWeights::default(), 1);
        assert_eq!(report.selection.verdict, RefereeVerdict::Selected);
        assert_eq!(report.selection.winners, vec!["strong".to_string()]);
    }

    #[test]
    fn identical_outputs_score_perfect_consistency() {
        let candidates = vec![candidate("a", 0.9, "same output"), candidate("b", 0.9, "same output")];
        let report = run_tournament(&candidates, &ScoreWeights::default(), 2);
        assert!(report.scores.iter().all(|s| s.consistency == 1.0));
    }

    #[test]
    fn top_k_caps_the_winner_count() {
        let candidates = vec![candidate("a", 0.9, "x"), candidate("b", 0.8, "y"), candidate("c", 0.7, "z")];
        let report = run_tournament(&candidates, &ScoreWeights::default(), 2);
        assert_eq!(report.selection.winners.len(), 2);
    }
}
