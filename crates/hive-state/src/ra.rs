//! The Requirement Analysis state machine (spec §4.3/§4.9).
//!
//! Grounded in `colonyforge.core.state.machines.RAStateMachine`
//! (`original_source/src/colonyforge/core/state/machines.py`), which the
//! Python source singles out as the one machine that overrides the static
//! transition-table model because several edges are payload-routed (the
//! `outcome` field of the completing event, not just its type, selects the
//! destination). The Rust translation keeps that shape explicit: most
//! events name a fixed destination, but the `CONTEXT_ENRICH`,
//! `CLARIFY_GEN`, `USER_FEEDBACK`, `CHALLENGE_REVIEW`, and `GUARD_GATE`
//! edges additionally consult an `outcome` string.

use hive_record::taxonomy::types;
use hive_types::RaState;

use crate::StateError;

/// The Requirement Analysis state machine.
pub struct RaMachine;

impl RaMachine {
    /// Applies `event_type` (optionally carrying `outcome`, the payload
    /// field that routes ambiguous edges) to `from`.
    pub fn transition(
        from: RaState,
        event_type: &str,
        outcome: Option<&str>,
    ) -> Result<RaState, StateError> {
        use RaState::*;
        match (from, event_type) {
            (Intake, t) if t == types::RA_INTAKE_RECEIVED => Ok(Triage),
            (Triage, t) if t == types::RA_TRIAGE_COMPLETED => Ok(ContextEnrich),
            (ContextEnrich, t) if t == types::RA_CONTEXT_ENRICHED => {
                Ok(match outcome {
                    Some("open_unknowns") => WebResearch,
                    _ => HypothesisBuild,
                })
            }
            (WebResearch, t) if t == types::RA_WEB_RESEARCHED => Ok(HypothesisBuild),
            (HypothesisBuild, t) if t == types::RA_HYPOTHESIS_BUILT => Ok(ClarifyGen),
            (ClarifyGen, t) if t == types::RA_CLARIFY_GENERATED => Ok(match outcome {
                Some("has_questions") => UserFeedback,
                _ => SpecSynthesis,
            }),
            (UserFeedback, t) if t == types::RA_USER_RESPONDED => match outcome {
                Some("needs_more_analysis") => Ok(HypothesisBuild),
                Some("abandon") => Ok(Abandoned),
                _ => Ok(SpecSynthesis),
            },
            (SpecSynthesis, t) if t == types::RA_SPEC_SYNTHESIZED => Ok(ChallengeReview),
            (ChallengeReview, t) if t == types::RA_CHALLENGE_REVIEWED => match outcome {
                Some("revise") => Ok(SpecSynthesis),
                Some("compare_drafts") => Ok(RefereeCompare),
                _ => Ok(GuardGate),
            },
            (RefereeCompare, t) if t == types::RA_REFEREE_COMPARED => Ok(GuardGate),
            (GuardGate, t) if t == types::RA_GATE_DECIDED => match outcome {
                Some("fail") => Ok(ClarifyGen),
                _ => Err(StateError::GuardRejected(
                    "ra.gate.decided without a terminal outcome must carry outcome=\"fail\""
                        .to_string(),
                )),
            },
            (GuardGate, t) if t == types::RA_COMPLETED => match outcome {
                Some("EXECUTION_READY") => Ok(ExecutionReady),
                Some("EXECUTION_READY_WITH_RISKS") => Ok(ExecutionReadyWithRisks),
                Some("ABANDONED") => Ok(Abandoned),
                other => Err(StateError::GuardRejected(format!(
                    "ra.completed carried unrecognized outcome {other:?}"
                ))),
            },
            _ => Err(StateError::InvalidTransition {
                from_state: format!("{from:?}"),
                event_type: event_type.to_string(),
            }),
        }
    }

    /// The valid event types from `from`, ignoring outcome-routing —
    /// useful for driving UIs/tests that want to know what can happen
    /// next without constructing a full event.
    pub fn valid_events(from: RaState) -> &'static [&'static str] {
        use RaState::*;
        match from {
            Intake => &[types::RA_INTAKE_RECEIVED],
            Triage => &[types::RA_TRIAGE_COMPLETED],
            ContextEnrich => &[types::RA_CONTEXT_ENRICHED],
            WebResearch => &[types::RA_WEB_RESEARCHED],
            HypothesisBuild => &[types::RA_HYPOTHESIS_BUILT],
            ClarifyGen => &[types::RA_CLARIFY_GENERATED],
            UserFeedback => &[types::RA_USER_RESPONDED],
            SpecSynthesis => &[types::RA_SPEC_SYNTHESIZED],
            ChallengeReview => &[types::RA_CHALLENGE_REVIEWED],
            RefereeCompare => &[types::RA_REFEREE_COMPARED],
            GuardGate => &[types::RA_GATE_DECIDED, types::RA_COMPLETED],
            ExecutionReady | ExecutionReadyWithRisks | Abandoned => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_happy_path_reaches_execution_ready() {
        let mut state = RaState::Intake;
        state = RaMachine::transition(state, types::RA_INTAKE_RECEIVED, None).unwrap();
        state = RaMachine::transition(state, types::RA_TRIAGE_COMPLETED, None).unwrap();
        state = RaMachine::transition(state, types::RA_CONTEXT_ENRICHED, None).unwrap();
        assert_eq!(state, RaState::HypothesisBuild);
        state = RaMachine::transition(state, types::RA_HYPOTHESIS_BUILT, None).unwrap();
        state = RaMachine::transition(
            state,
            types::RA_CLARIFY_GENERATED,
            Some("has_questions"),
        )
        .unwrap();
        assert_eq!(state, RaState::UserFeedback);
        state = RaMachine::transition(state, types::RA_USER_RESPONDED, None).unwrap();
        assert_eq!(state, RaState::SpecSynthesis);
        state = RaMachine::transition(state, types::RA_SPEC_SYNTHESIZED, None).unwrap();
        state = RaMachine::transition(state, types::RA_CHALLENGE_REVIEWED, None).unwrap();
        assert_eq!(state, RaState::GuardGate);
        state = RaMachine::transition(
            state,
            types::RA_COMPLETED,
            Some("EXECUTION_READY"),
        )
        .unwrap();
        assert_eq!(state, RaState::ExecutionReady);
        assert!(state.is_terminal());
    }

    #[test]
    fn guard_gate_fail_loops_back_to_clarify_gen() {
        let next =
            RaMachine::transition(RaState::GuardGate, types::RA_GATE_DECIDED, Some("fail"))
                .unwrap();
        assert_eq!(next, RaState::ClarifyGen);
    }

    #[test]
    fn web_research_is_skippable_when_no_open_unknowns() {
        let next =
            RaMachine::transition(RaState::ContextEnrich, types::RA_CONTEXT_ENRICHED, None)
                .unwrap();
        assert_eq!(next, RaState::HypothesisBuild);
    }

    #[test]
    fn referee_compare_only_reached_with_explicit_outcome() {
        let next = RaMachine::transition(
            RaState::ChallengeReview,
            types::RA_CHALLENGE_REVIEWED,
            Some("compare_drafts"),
        )
        .unwrap();
        assert_eq!(next, RaState::RefereeCompare);
    }
}
