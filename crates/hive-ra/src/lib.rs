//! Requirement Analysis pipeline: drives a raw goal through ambiguity
//! triage, evidence gathering, clarification, spec synthesis, and a
//! completeness gate before a run is allowed to dispatch (spec §4.9).
//!
//! Grounded in `colonyforge.core.events.ra` for the event shapes and
//! `colonyforge.core.state.machines.RAStateMachine` (via
//! [`hive_state::RaMachine`]) for the transition table; the collaborator
//! interfaces themselves (`ContextForager`, `IntentMiner`, ...) are not
//! backed by a single original module — they are spec §4.9's own
//! enumeration, translated directly into injectable traits so the
//! pipeline stays drivable without a real LLM.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use hive_record::{taxonomy::types as ev, Event, EventLog, RecordError};
use hive_state::{RaMachine, StateError};
use hive_types::{AnalysisPath, Evidence, RaSpecDraft, RaState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised driving the pipeline.
#[derive(Debug, Error)]
pub enum RaError {
    /// The requested step does not apply to the session's current state.
    #[error(transparent)]
    InvalidStep(#[from] StateError),
    /// The event log rejected an append.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// `step` was called with user input that the current state does not
    /// expect (or without input that it does).
    #[error("unexpected input for state {0:?}")]
    UnexpectedInput(RaState),
}

// ---------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------

/// Ambiguity-scorer output (spec §4.9: "obtain `{ambiguity,
/// context_sufficiency, execution_risk}`").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AmbiguityScore {
    /// 0 (unambiguous) to 1 (hopelessly vague).
    pub ambiguity: f64,
    /// 0 (no context) to 1 (fully specified).
    pub context_sufficiency: f64,
    /// 0 (safe) to 1 (high blast radius if misunderstood).
    pub execution_risk: f64,
}

/// Extracted goals/unknowns for a raw intake (spec §4.9: "IntentMiner
/// extracts goals and unknowns").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentGraph {
    /// Distinct goal statements found in the raw text.
    pub goals: Vec<String>,
    /// Open questions the text leaves unresolved.
    pub unknowns: Vec<String>,
}

/// Resolution state of a mapped assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionStatus {
    /// Not yet validated.
    Open,
    /// Validated true.
    Confirmed,
    /// Validated false; the spec must account for its absence.
    Rejected,
}

/// One filled-in gap in the goal (spec §4.9: "AssumptionMapper produces
/// `Assumption` records with confidence and status").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumption {
    /// Stable id within the session.
    pub id: String,
    /// The assumption's text.
    pub text: String,
    /// How confident the mapper is, in `[0, 1]`.
    pub confidence: f64,
    /// Current validation status.
    pub status: AssumptionStatus,
}

/// How severe a predicted failure mode is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisSeverity {
    /// Worth noting in the spec's open items.
    Minor,
    /// Blocks a PASS verdict until addressed or explicitly accepted.
    Critical,
}

/// A predicted way the goal, as understood, could go wrong (spec §4.9:
/// "RiskChallenger produces `FailureHypothesis` records").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureHypothesis {
    /// Stable id within the session.
    pub id: String,
    /// What could fail and why.
    pub description: String,
    /// How severe the predicted failure is.
    pub severity: HypothesisSeverity,
}

/// A round of clarification questions surfaced to the user (spec §4.9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClarificationRound {
    /// Stable id for this round.
    pub round_id: String,
    /// The questions themselves.
    pub questions: Vec<String>,
}

/// The user's decision after answering a [`ClarificationRound`] (spec
/// §4.9 UserFeedback edges).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFeedbackDecision {
    /// Answers were enough; proceed to spec synthesis.
    Proceed,
    /// Answers revealed new unknowns; redo hypothesis building.
    NeedsMoreAnalysis,
    /// The user gave up.
    Abandon,
}

/// Completeness verdict from the Guard Gate (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Ready to dispatch with no residual concerns.
    Pass { residual_risk: bool },
    /// Not complete; loop back to clarification.
    Fail,
}

// ---------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------

/// Scores raw intake text for ambiguity and routes it to an
/// [`AnalysisPath`] (spec §4.9).
#[async_trait]
pub trait AmbiguityScorer: Send + Sync {
    /// Scores `raw_text`.
    async fn score(&self, raw_text: &str) -> (AmbiguityScore, AnalysisPath);
}

/// Gathers internal evidence (past decisions, related runs).
#[async_trait]
pub trait ContextForager: Send + Sync {
    /// Returns evidence relevant to `goal`.
    async fn forage(&self, goal: &str) -> Vec<Evidence>;
}

/// Conditional external research over open unknowns.
#[async_trait]
pub trait WebResearcher: Send + Sync {
    /// Returns evidence addressing `unknowns`.
    async fn research(&self, goal: &str, unknowns: &[String]) -> Vec<Evidence>;
}

/// Extracts goals and unknowns from the intake text and gathered evidence.
#[async_trait]
pub trait IntentMiner: Send + Sync {
    /// Builds an [`IntentGraph`] for `goal`.
    async fn mine(&self, goal: &str, evidence: &[Evidence]) -> IntentGraph;
}

/// Fills gaps in the intent graph with explicit, checkable assumptions.
#[async_trait]
pub trait AssumptionMapper: Send + Sync {
    /// Maps `intent`'s unknowns to assumptions.
    async fn map(&self, intent: &IntentGraph) -> Vec<Assumption>;
}

/// Predicts ways the current understanding could fail, either from the
/// intent graph alone (pre-synthesis) or against a drafted spec.
#[async_trait]
pub trait RiskChallenger: Send + Sync {
    /// Produces hypotheses for `intent`, optionally checked against
    /// `draft` when one exists.
    async fn challenge(
        &self,
        goal: &str,
        intent: &IntentGraph,
        draft: Option<&RaSpecDraft>,
    ) -> Vec<FailureHypothesis>;
}

/// Generates a round of clarification questions for the user.
#[async_trait]
pub trait ClarifyGenerator: Send + Sync {
    /// Builds a [`ClarificationRound`] from the current understanding.
    async fn generate(&self, intent: &IntentGraph, hypotheses: &[FailureHypothesis]) -> ClarificationRound;
}

/// Builds a [`RaSpecDraft`] from everything gathered so far.
#[async_trait]
pub trait SpecSynthesizer: Send + Sync {
    /// Synthesizes a draft for `goal`.
    async fn synthesize(&self, goal: &str, intent: &IntentGraph, assumptions: &[Assumption]) -> RaSpecDraft;
}

/// Chooses among multiple drafts when more than one exists.
#[async_trait]
pub trait RefereeComparer: Send + Sync {
    /// Returns the index, within `drafts`, of the winning draft.
    async fn compare(&self, drafts: &[RaSpecDraft]) -> usize;
}

/// Renders the final completeness verdict.
#[async_trait]
pub trait RaGuardGate: Send + Sync {
    /// Decides whether `draft` is ready to dispatch given `hypotheses`.
    async fn decide(&self, draft: &RaSpecDraft, hypotheses: &[FailureHypothesis]) -> GateDecision;
}

/// No-op stand-ins for every collaborator role, used when the caller
/// supplies none (spec §4.9: "stub behavior (no-op producing empty
/// results and passing the gate) is used so the pipeline remains
/// drivable without real LLM dependencies").
pub struct NoopCollaborators;

#[async_trait]
impl AmbiguityScorer for NoopCollaborators {
    async fn score(&self, _raw_text: &str) -> (AmbiguityScore, AnalysisPath) {
        (AmbiguityScore { ambiguity: 0.0, context_sufficiency: 1.0, execution_risk: 0.0 }, AnalysisPath::InstantPass)
    }
}

#[async_trait]
impl ContextForager for NoopCollaborators {
    async fn forage(&self, _goal: &str) -> Vec<Evidence> {
        Vec::new()
    }
}

#[async_trait]
impl WebResearcher for NoopCollaborators {
    async fn research(&self, _goal: &str, _unknowns: &[String]) -> Vec<Evidence> {
        Vec::new()
    }
}

#[async_trait]
impl IntentMiner for NoopCollaborators {
    async fn mine(&self, goal: &str, _evidence: &[Evidence]) -> IntentGraph {
        IntentGraph { goals: vec![goal.to_string()], unknowns: Vec::new() }
    }
}

#[async_trait]
impl AssumptionMapper for NoopCollaborators {
    async fn map(&self, _intent: &IntentGraph) -> Vec<Assumption> {
        Vec::new()
    }
}

#[async_trait]
impl RiskChallenger for NoopCollaborators {
    async fn challenge(
        &self,
        _goal: &str,
        _intent: &IntentGraph,
        _draft: Option<&RaSpecDraft>,
    ) -> Vec<FailureHypothesis> {
        Vec::new()
    }
}

#[async_trait]
impl ClarifyGenerator for NoopCollaborators {
    async fn generate(&self, _intent: &IntentGraph, _hypotheses: &[FailureHypothesis]) -> ClarificationRound {
        ClarificationRound { round_id: Uuid::new_v4().to_string(), questions: Vec::new() }
    }
}

#[async_trait]
impl SpecSynthesizer for NoopCollaborators {
    async fn synthesize(&self, goal: &str, intent: &IntentGraph, _assumptions: &[Assumption]) -> RaSpecDraft {
        RaSpecDraft {
            draft_id: Uuid::new_v4().to_string(),
            version: 1,
            goal: goal.to_string(),
            acceptance_criteria: intent.goals.clone(),
            constraints: Vec::new(),
            non_goals: Vec::new(),
            open_items: intent.unknowns.clone(),
        }
    }
}

#[async_trait]
impl RefereeComparer for NoopCollaborators {
    async fn compare(&self, _drafts: &[RaSpecDraft]) -> usize {
        0
    }
}

#[async_trait]
impl RaGuardGate for NoopCollaborators {
    async fn decide(&self, _draft: &RaSpecDraft, _hypotheses: &[FailureHypothesis]) -> GateDecision {
        GateDecision::Pass { residual_risk: false }
    }
}

/// Bundle of every injectable collaborator role. `Default` wires every
/// role to [`NoopCollaborators`].
pub struct RaCollaborators {
    /// Ambiguity/triage scorer.
    pub ambiguity_scorer: Box<dyn AmbiguityScorer>,
    /// Internal evidence gatherer.
    pub forager: Box<dyn ContextForager>,
    /// External research, gated on open unknowns.
    pub web_researcher: Box<dyn WebResearcher>,
    /// Goal/unknown extractor.
    pub intent_miner: Box<dyn IntentMiner>,
    /// Assumption filler.
    pub assumption_mapper: Box<dyn AssumptionMapper>,
    /// Failure-mode predictor.
    pub risk_challenger: Box<dyn RiskChallenger>,
    /// Clarification-question generator.
    pub clarify_generator: Box<dyn ClarifyGenerator>,
    /// Spec drafter.
    pub spec_synthesizer: Box<dyn SpecSynthesizer>,
    /// Multi-draft chooser.
    pub referee: Box<dyn RefereeComparer>,
    /// Completeness gate.
    pub guard_gate: Box<dyn RaGuardGate>,
}

impl Default for RaCollaborators {
    fn default() -> Self {
        RaCollaborators {
            ambiguity_scorer: Box::new(NoopCollaborators),
            forager: Box::new(NoopCollaborators),
            web_researcher: Box::new(NoopCollaborators),
            intent_miner: Box::new(NoopCollaborators),
            assumption_mapper: Box::new(NoopCollaborators),
            risk_challenger: Box::new(NoopCollaborators),
            clarify_generator: Box::new(NoopCollaborators),
            spec_synthesizer: Box::new(NoopCollaborators),
            referee: Box::new(NoopCollaborators),
            guard_gate: Box::new(NoopCollaborators),
        }
    }
}

// ---------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------

/// Accumulated working state of one requirement analysis (spec §4.9).
#[derive(Debug, Clone, Default)]
pub struct RaSession {
    /// Current pipeline state.
    pub state: Option<RaState>,
    /// Original goal text.
    pub goal: String,
    /// Extracted intent graph, once mined.
    pub intent: IntentGraph,
    /// Mapped assumptions.
    pub assumptions: Vec<Assumption>,
    /// Predicted failure hypotheses, accumulated across phases.
    pub hypotheses: Vec<FailureHypothesis>,
    /// Evidence gathered so far.
    pub evidence: Vec<Evidence>,
    /// Drafts produced so far (normally one; more than one only when a
    /// revision cycle ran before a referee comparison).
    pub drafts: Vec<RaSpecDraft>,
    /// Clarification rounds raised so far.
    pub clarifications: Vec<ClarificationRound>,
}

impl RaSession {
    fn state(&self) -> RaState {
        self.state.expect("session must be intaken before stepping")
    }

    /// The winning draft, once one exists.
    pub fn current_draft(&self) -> Option<&RaSpecDraft> {
        self.drafts.last()
    }
}

/// Drives an [`RaSession`] through the Requirement Analysis pipeline,
/// emitting one `ra.*` event per transition (spec §4.9).
pub struct RaPipeline<'a> {
    log: &'a dyn EventLog,
    run_id: String,
    collaborators: RaCollaborators,
}

impl<'a> RaPipeline<'a> {
    /// Builds a pipeline appending audit events to `log` for `run_id`.
    pub fn new(log: &'a dyn EventLog, run_id: impl Into<String>, collaborators: RaCollaborators) -> Self {
        RaPipeline { log, run_id: run_id.into(), collaborators }
    }

    /// Stage 1: records the raw text, scores it, and transitions to
    /// `TRIAGE` then on into `CONTEXT_ENRICH` (spec §4.9: "`intake
    /// (raw_text)`... transitions to TRIAGE").
    #[tracing::instrument(skip(self))]
    pub async fn intake(&self, raw_text: &str) -> Result<(RaSession, AnalysisPath), RaError> {
        self.append(ev::RA_INTAKE_RECEIVED, serde_json::json!({ "raw_text": raw_text })).await?;
        let state = RaMachine::transition(RaState::Intake, ev::RA_INTAKE_RECEIVED, None)?;

        let (score, path) = self.collaborators.ambiguity_scorer.score(raw_text).await;
        self.append(
            ev::RA_TRIAGE_COMPLETED,
            serde_json::json!({ "ambiguity": score.ambiguity, "context_sufficiency": score.context_sufficiency,
                "execution_risk": score.execution_risk, "path": path }),
        )
        .await?;
        let state = RaMachine::transition(state, ev::RA_TRIAGE_COMPLETED, None)?;

        let session = RaSession { state: Some(state), goal: raw_text.to_string(), ..Default::default() };
        Ok((session, path))
    }

    /// Advances `session` by exactly one pipeline stage (spec §4.9:
    /// "Subsequent `step()` calls dispatch by current state through
    /// collaborators"). `user_feedback` is consulted only when the
    /// session is in `USER_FEEDBACK`; it is an error to supply it
    /// otherwise, or to omit it there.
    #[tracing::instrument(skip(self, session, user_feedback))]
    pub async fn step(
        &self,
        mut session: RaSession,
        user_feedback: Option<UserFeedbackDecision>,
    ) -> Result<RaSession, RaError> {
        match session.state() {
            RaState::ContextEnrich => {
                let mut evidence = self.collaborators.forager.forage(&session.goal).await;
                let intent = self.collaborators.intent_miner.mine(&session.goal, &evidence).await;
                let open_unknowns = !intent.unknowns.is_empty();
                session.evidence.append(&mut evidence);
                session.intent = intent;

                self.append(
                    ev::RA_CONTEXT_ENRICHED,
                    serde_json::json!({ "open_unknowns": open_unknowns, "unknown_count": session.intent.unknowns.len() }),
                )
                .await?;
                let outcome = open_unknowns.then_some("open_unknowns");
                session.state = Some(RaMachine::transition(session.state(), ev::RA_CONTEXT_ENRICHED, outcome)?);
            }
            RaState::WebResearch => {
                let mut evidence =
                    self.collaborators.web_researcher.research(&session.goal, &session.intent.unknowns).await;
                session.evidence.append(&mut evidence);
                self.append(ev::RA_WEB_RESEARCHED, serde_json::json!({ "evidence_count": evidence.len() })).await?;
                session.state = Some(RaMachine::transition(session.state(), ev::RA_WEB_RESEARCHED, None)?);
            }
            RaState::HypothesisBuild => {
                let mut hypotheses =
                    self.collaborators.risk_challenger.challenge(&session.goal, &session.intent, None).await;
                let mut assumptions = self.collaborators.assumption_mapper.map(&session.intent).await;
                session.hypotheses.append(&mut hypotheses);
                session.assumptions.append(&mut assumptions);
                self.append(
                    ev::RA_HYPOTHESIS_BUILT,
                    serde_json::json!({ "hypothesis_count": session.hypotheses.len(), "assumption_count": session.assumptions.len() }),
                )
                .await?;
                session.state = Some(RaMachine::transition(session.state(), ev::RA_HYPOTHESIS_BUILT, None)?);
            }
            RaState::ClarifyGen => {
                let round =
                    self.collaborators.clarify_generator.generate(&session.intent, &session.hypotheses).await;
                let has_questions = !round.questions.is_empty();
                self.append(
                    ev::RA_CLARIFY_GENERATED,
                    serde_json::json!({ "round_id": round.round_id, "question_count": round.questions.len() }),
                )
                .await?;
                session.clarifications.push(round);
                let outcome = has_questions.then_some("has_questions");
                session.state = Some(RaMachine::transition(session.state(), ev::RA_CLARIFY_GENERATED, outcome)?);
            }
            RaState::UserFeedback => {
                let decision = user_feedback.ok_or(RaError::UnexpectedInput(RaState::UserFeedback))?;
                let outcome = match decision {
                    UserFeedbackDecision::Proceed => None,
                    UserFeedbackDecision::NeedsMoreAnalysis => Some("needs_more_analysis"),
                    UserFeedbackDecision::Abandon => Some("abandon"),
                };
                self.append(ev::RA_USER_RESPONDED, serde_json::json!({ "decision": format!("{decision:?}") })).await?;
                session.state = Some(RaMachine::transition(session.state(), ev::RA_USER_RESPONDED, outcome)?);
            }
            RaState::SpecSynthesis => {
                let draft = self
                    .collaborators
                    .spec_synthesizer
                    .synthesize(&session.goal, &session.intent, &session.assumptions)
                    .await;
                self.append(
                    ev::RA_SPEC_SYNTHESIZED,
                    serde_json::json!({ "draft_id": draft.draft_id, "version": draft.version }),
                )
                .await?;
                session.drafts.push(draft);
                session.state = Some(RaMachine::transition(session.state(), ev::RA_SPEC_SYNTHESIZED, None)?);
            }
            RaState::ChallengeReview => {
                let draft = session.current_draft().cloned();
                let mut hypotheses = self
                    .collaborators
                    .risk_challenger
                    .challenge(&session.goal, &session.intent, draft.as_ref())
                    .await;
                let has_critical = hypotheses.iter().any(|h| h.severity == HypothesisSeverity::Critical);
                session.hypotheses.append(&mut hypotheses);

                let outcome = if has_critical {
                    Some("revise")
                } else if session.drafts.len() > 1 {
                    Some("compare_drafts")
                } else {
                    None
                };
                self.append(
                    ev::RA_CHALLENGE_REVIEWED,
                    serde_json::json!({ "has_critical_hypothesis": has_critical, "draft_count": session.drafts.len() }),
                )
                .await?;
                session.state = Some(RaMachine::transition(session.state(), ev::RA_CHALLENGE_REVIEWED, outcome)?);
            }
            RaState::RefereeCompare => {
                let winner = self.collaborators.referee.compare(&session.drafts).await;
                if winner < session.drafts.len() && winner != session.drafts.len() - 1 {
                    let chosen = session.drafts.swap_remove(winner);
                    session.drafts.push(chosen);
                }
                self.append(ev::RA_REFEREE_COMPARED, serde_json::json!({ "winner_index": winner })).await?;
                session.state = Some(RaMachine::transition(session.state(), ev::RA_REFEREE_COMPARED, None)?);
            }
            RaState::GuardGate => {
                let draft = session
                    .current_draft()
                    .cloned()
                    .expect("GuardGate is unreachable without a synthesized draft");
                let decision = self.collaborators.guard_gate.decide(&draft, &session.hypotheses).await;
                match decision {
                    GateDecision::Fail => {
                        self.append(ev::RA_GATE_DECIDED, serde_json::json!({ "verdict": "fail" })).await?;
                        session.state =
                            Some(RaMachine::transition(session.state(), ev::RA_GATE_DECIDED, Some("fail"))?);
                    }
                    GateDecision::Pass { residual_risk } => {
                        self.append(
                            ev::RA_GATE_DECIDED,
                            serde_json::json!({ "verdict": "pass", "residual_risk": residual_risk }),
                        )
                        .await?;
                        let terminal = if residual_risk { "EXECUTION_READY_WITH_RISKS" } else { "EXECUTION_READY" };
                        self.append(ev::RA_COMPLETED, serde_json::json!({ "outcome": terminal })).await?;
                        session.state = Some(RaMachine::transition(session.state(), ev::RA_COMPLETED, Some(terminal))?);
                    }
                }
            }
            terminal @ (RaState::ExecutionReady | RaState::ExecutionReadyWithRisks | RaState::Abandoned) => {
                return Err(RaError::UnexpectedInput(terminal));
            }
        }
        Ok(session)
    }

    /// Drives `session` with [`Self::step`] until it reaches a terminal
    /// state, using `user_feedback_fn` to resolve any `USER_FEEDBACK`
    /// suspension points it encounters.
    pub async fn run_to_completion(
        &self,
        mut session: RaSession,
        user_feedback_fn: &dyn Fn(&RaSession, &ClarificationRound) -> UserFeedbackDecision,
    ) -> Result<RaSession, RaError> {
        while !session.state().is_terminal() {
            let feedback = if session.state() == RaState::UserFeedback {
                let round = session.clarifications.last().expect("UserFeedback reached without a round");
                Some(user_feedback_fn(&session, round))
            } else {
                None
            };
            session = self.step(session, feedback).await?;
        }
        Ok(session)
    }

    async fn append(&self, event_type: &str, payload: serde_json::Value) -> Result<Event, RecordError> {
        let event = Event::new(event_type, &self.run_id, "system", payload);
        self.log.append(&self.run_id, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_record::InMemoryEventLog;

    #[tokio::test]
    async fn noop_collaborators_drive_straight_to_execution_ready() {
        let log = InMemoryEventLog::new();
        let pipeline = RaPipeline::new(&log, "run-1", RaCollaborators::default());
        let (session, path) = pipeline.intake("ship the thing").await.unwrap();
        assert_eq!(path, AnalysisPath::InstantPass);

        let result = pipeline.run_to_completion(session, &|_s, _r| UserFeedbackDecision::Proceed).await.unwrap();
        assert_eq!(result.state, Some(RaState::ExecutionReady));
    }

    struct AlwaysAmbiguous;
    #[async_trait]
    impl AmbiguityScorer for AlwaysAmbiguous {
        async fn score(&self, _raw_text: &str) -> (AmbiguityScore, AnalysisPath) {
            (AmbiguityScore { ambiguity: 0.9, context_sufficiency: 0.1, execution_risk: 0.5 }, AnalysisPath::FullAnalysis)
        }
    }

    struct OneUnknownMiner;
    #[async_trait]
    impl IntentMiner for OneUnknownMiner {
        async fn mine(&self, goal: &str, _evidence: &[Evidence]) -> IntentGraph {
            IntentGraph { goals: vec![goal.to_string()], unknowns: vec!["which database?".to_string()] }
        }
    }

    struct OneQuestionClarifier;
    #[async_trait]
    impl ClarifyGenerator for OneQuestionClarifier {
        async fn generate(&self, _intent: &IntentGraph, _hypotheses: &[FailureHypothesis]) -> ClarificationRound {
            ClarificationRound { round_id: "r1".to_string(), questions: vec!["which database?".to_string()] }
        }
    }

    #[tokio::test]
    async fn open_unknowns_route_through_web_research_and_user_feedback() {
        let log = InMemoryEventLog::new();
        let collaborators = RaCollaborators {
            intent_miner: Box::new(OneUnknownMiner),
            clarify_generator: Box::new(OneQuestionClarifier),
            ..RaCollaborators::default()
        };
        let pipeline = RaPipeline::new(&log, "run-2", collaborators);
        let (session, _) = pipeline.intake("build a thing").await.unwrap();
        let result = pipeline.run_to_completion(session, &|_s, _r| UserFeedbackDecision::Proceed).await.unwrap();
        assert_eq!(result.state, Some(RaState::ExecutionReady));
        assert_eq!(result.clarifications.len(), 1);
    }

    struct OneCriticalChallenger {
        calls: std::sync::atomic::AtomicUsize,
    }
    #[async_trait]
    impl RiskChallenger for OneCriticalChallenger {
        async fn challenge(
            &self,
            _goal: &str,
            _intent: &IntentGraph,
            draft: Option<&RaSpecDraft>,
        ) -> Vec<FailureHypothesis> {
            if draft.is_some() && self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                vec![FailureHypothesis {
                    id: "h1".to_string(),
                    description: "no rollback plan".to_string(),
                    severity: HypothesisSeverity::Critical,
                }]
            } else {
                Vec::new()
            }
        }
    }

    #[tokio::test]
    async fn critical_hypothesis_at_challenge_review_forces_a_revision() {
        let log = InMemoryEventLog::new();
        let collaborators = RaCollaborators {
            risk_challenger: Box::new(OneCriticalChallenger { calls: std::sync::atomic::AtomicUsize::new(0) }),
            ..RaCollaborators::default()
        };
        let pipeline = RaPipeline::new(&log, "run-3", collaborators);
        let (session, _) = pipeline.intake("ship the thing").await.unwrap();
        let result = pipeline.run_to_completion(session, &|_s, _r| UserFeedbackDecision::Proceed).await.unwrap();
        assert_eq!(result.state, Some(RaState::ExecutionReady));
        assert_eq!(result.drafts.len(), 2, "a revision cycle should have produced a second draft");
    }

    #[tokio::test]
    async fn abandon_decision_reaches_abandoned_terminal_state() {
        let log = InMemoryEventLog::new();
        let collaborators = RaCollaborators {
            intent_miner: Box::new(OneUnknownMiner),
            clarify_generator: Box::new(OneQuestionClarifier),
            ..RaCollaborators::default()
        };
        let pipeline = RaPipeline::new(&log, "run-4", collaborators);
        let (session, _) = pipeline.intake("build a thing").await.unwrap();
        let result = pipeline.run_to_completion(session, &|_s, _r| UserFeedbackDecision::Abandon).await.unwrap();
        assert_eq!(result.state, Some(RaState::Abandoned));
    }
}
