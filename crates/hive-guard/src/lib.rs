//! Two-layer plan verifier: structural (L1) and semantic (L2) rules over a
//! [`TaskPlan`] (spec §4.7).
//!
//! Grounded in `colonyforge.queen_bee.guard_verifier.GuardVerifier`: a list
//! of named rules each producing a pass/fail verdict plus evidence, folded
//! into one [`GuardReport`]. L1 failures are load-bearing (plan is simply
//! broken); L2 failures degrade the verdict to `CONDITIONAL_PASS` rather
//! than blocking execution outright.

#![forbid(unsafe_code)]

use std::collections::HashSet;

use hive_types::{Evidence, GuardReport, RuleLevel, RuleResult, TaskPlan, Verdict};

/// Default token-overlap ratio an L2 goal-coverage rule must clear.
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.3;

/// A single named check contributing one [`RuleResult`] to a [`GuardReport`].
pub trait Rule: Send + Sync {
    /// Stable identifier, reported as `RuleResult::rule_name`.
    fn name(&self) -> &str;
    /// Which verdict layer this rule belongs to.
    fn level(&self) -> RuleLevel;
    /// Evaluates `plan` (and the original `goal`, for L2 coverage checks),
    /// consuming any `evidence` it needs.
    fn evaluate(&self, plan: &TaskPlan, goal: &str, evidence: &[Evidence]) -> RuleResult;
}

fn pass(rule_name: &str, level: RuleLevel, message: impl Into<String>) -> RuleResult {
    RuleResult {
        rule_name: rule_name.to_string(),
        level,
        passed: true,
        message: message.into(),
        evidence_type: None,
        details: serde_json::Value::Null,
    }
}

fn fail(rule_name: &str, level: RuleLevel, message: impl Into<String>) -> RuleResult {
    RuleResult {
        rule_name: rule_name.to_string(),
        level,
        passed: false,
        message: message.into(),
        evidence_type: None,
        details: serde_json::Value::Null,
    }
}

/// L1: the plan must contain at least one task.
pub struct NonEmptyPlanRule;
impl Rule for NonEmptyPlanRule {
    fn name(&self) -> &str {
        "non_empty_plan"
    }
    fn level(&self) -> RuleLevel {
        RuleLevel::L1
    }
    fn evaluate(&self, plan: &TaskPlan, _goal: &str, _evidence: &[Evidence]) -> RuleResult {
        if plan.tasks.is_empty() {
            fail(self.name(), self.level(), "plan has no tasks")
        } else {
            pass(self.name(), self.level(), format!("{} task(s)", plan.tasks.len()))
        }
    }
}

/// L1: every `task_id` is unique.
pub struct UniqueTaskIdsRule;
impl Rule for UniqueTaskIdsRule {
    fn name(&self) -> &str {
        "unique_task_ids"
    }
    fn level(&self) -> RuleLevel {
        RuleLevel::L1
    }
    fn evaluate(&self, plan: &TaskPlan, _goal: &str, _evidence: &[Evidence]) -> RuleResult {
        let mut seen = HashSet::new();
        for t in &plan.tasks {
            if !seen.insert(t.task_id.as_str()) {
                return fail(self.name(), self.level(), format!("duplicate task_id {:?}", t.task_id));
            }
        }
        pass(self.name(), self.level(), "all task ids unique")
    }
}

/// L1: every `depends_on` reference resolves to a task in the plan.
pub struct ResolvedDependenciesRule;
impl Rule for ResolvedDependenciesRule {
    fn name(&self) -> &str {
        "resolved_dependencies"
    }
    fn level(&self) -> RuleLevel {
        RuleLevel::L1
    }
    fn evaluate(&self, plan: &TaskPlan, _goal: &str, _evidence: &[Evidence]) -> RuleResult {
        let ids: HashSet<&str> = plan.tasks.iter().map(|t| t.task_id.as_str()).collect();
        for t in &plan.tasks {
            for dep in &t.depends_on {
                if !ids.contains(dep.as_str()) {
                    return fail(
                        self.name(),
                        self.level(),
                        format!("task {:?} depends on unknown task {:?}", t.task_id, dep),
                    );
                }
            }
        }
        pass(self.name(), self.level(), "all dependencies resolve")
    }
}

/// L1: the dependency graph contains no cycles.
pub struct NoCyclesRule;
impl Rule for NoCyclesRule {
    fn name(&self) -> &str {
        "no_cycles"
    }
    fn level(&self) -> RuleLevel {
        RuleLevel::L1
    }
    fn evaluate(&self, plan: &TaskPlan, _goal: &str, _evidence: &[Evidence]) -> RuleResult {
        match plan.validate_structure() {
            Ok(()) => pass(self.name(), self.level(), "dependency graph is acyclic"),
            Err(e) => fail(self.name(), self.level(), e.to_string()),
        }
    }
}

/// L1: every task carries a non-empty goal string.
pub struct GoalPresentRule;
impl Rule for GoalPresentRule {
    fn name(&self) -> &str {
        "goal_present"
    }
    fn level(&self) -> RuleLevel {
        RuleLevel::L1
    }
    fn evaluate(&self, plan: &TaskPlan, _goal: &str, _evidence: &[Evidence]) -> RuleResult {
        for t in &plan.tasks {
            if t.goal.trim().is_empty() {
                return fail(self.name(), self.level(), format!("task {:?} has an empty goal", t.task_id));
            }
        }
        pass(self.name(), self.level(), "every task has a goal")
    }
}

/// L2: the union of task goals covers the original goal, measured as a
/// token-overlap ratio against [`DEFAULT_COVERAGE_THRESHOLD`] (spec §4.7).
pub struct GoalCoverageRule {
    /// Minimum fraction of the original goal's distinct tokens that must
    /// appear somewhere across the plan's task goals.
    pub threshold: f64,
}

impl Default for GoalCoverageRule {
    fn default() -> Self {
        GoalCoverageRule { threshold: DEFAULT_COVERAGE_THRESHOLD }
    }
}

impl Rule for GoalCoverageRule {
    fn name(&self) -> &str {
        "goal_coverage"
    }
    fn level(&self) -> RuleLevel {
        RuleLevel::L2
    }
    fn evaluate(&self, plan: &TaskPlan, goal: &str, _evidence: &[Evidence]) -> RuleResult {
        let goal_tokens = tokenize(goal);
        if goal_tokens.is_empty() {
            return pass(self.name(), self.level(), "original goal has no tokens to cover");
        }
        let plan_tokens: HashSet<String> =
            plan.tasks.iter().flat_map(|t| tokenize(&t.goal)).collect();
        let covered = goal_tokens.iter().filter(|t| plan_tokens.contains(*t)).count();
        let ratio = covered as f64 / goal_tokens.len() as f64;
        let mut result = if ratio >= self.threshold {
            pass(
                self.name(),
                self.level(),
                format!("plan goals cover {:.0}% of original goal tokens", ratio * 100.0),
            )
        } else {
            fail(
                self.name(),
                self.level(),
                format!(
                    "plan goals cover only {:.0}% of original goal tokens (threshold {:.0}%)",
                    ratio * 100.0,
                    self.threshold * 100.0
                ),
            )
        };
        result.details = serde_json::json!({ "coverage_ratio": ratio, "threshold": self.threshold });
        result
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Default rule set: every built-in L1 rule plus the default-threshold L2
/// coverage rule, in evaluation order.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(NonEmptyPlanRule),
        Box::new(UniqueTaskIdsRule),
        Box::new(ResolvedDependenciesRule),
        Box::new(NoCyclesRule),
        Box::new(GoalPresentRule),
        Box::new(GoalCoverageRule::default()),
    ]
}

/// Evaluates `rules` against `plan`/`goal`/`evidence` and folds the results
/// into a final [`GuardReport`] (spec §4.7: FAIL if any L1 fails,
/// CONDITIONAL_PASS if all L1 pass but some L2 fails, else PASS).
pub fn evaluate(plan: &TaskPlan, goal: &str, evidence: &[Evidence], rules: &[Box<dyn Rule>]) -> GuardReport {
    let rule_results: Vec<RuleResult> = rules.iter().map(|r| r.evaluate(plan, goal, evidence)).collect();
    let l1_passed = rule_results.iter().filter(|r| r.level == RuleLevel::L1).all(|r| r.passed);
    let l2_passed = rule_results.iter().filter(|r| r.level == RuleLevel::L2).all(|r| r.passed);

    let verdict = if !l1_passed {
        Verdict::Fail
    } else if !l2_passed {
        Verdict::ConditionalPass
    } else {
        Verdict::Pass
    };

    let remand_reason = if verdict != Verdict::Pass {
        rule_results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| format!("{}: {}", r.rule_name, r.message))
            .collect::<Vec<_>>()
            .first()
            .cloned()
    } else {
        None
    };

    let improvement_instructions = rule_results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("fix rule {:?}: {}", r.rule_name, r.message))
        .collect();

    GuardReport {
        verdict,
        l1_passed,
        l2_passed,
        rule_results,
        remand_reason,
        improvement_instructions,
    }
}

/// Convenience entry point running [`default_rules`] (spec §4.7's default
/// verifier configuration).
pub fn evaluate_with_defaults(plan: &TaskPlan, goal: &str, evidence: &[Evidence]) -> GuardReport {
    evaluate(plan, goal, evidence, &default_rules())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::PlannedTask;

    fn plan(tasks: Vec<PlannedTask>) -> TaskPlan {
        TaskPlan { tasks, reasoning: String::new(), is_fallback: false }
    }

    #[test]
    fn well_formed_plan_with_good_coverage_passes() {
        let p = plan(vec![
            PlannedTask { task_id: "t1".into(), goal: "write the login endpoint".into(), depends_on: vec![] },
            PlannedTask { task_id: "t2".into(), goal: "add tests for login endpoint".into(), depends_on: vec!["t1".into()] },
        ]);
        let report = evaluate_with_defaults(&p, "implement login endpoint with tests", &[]);
        assert_eq!(report.verdict, Verdict::Pass);
        assert!(report.l1_passed && report.l2_passed);
    }

    #[test]
    fn empty_plan_fails_l1() {
        let p = plan(vec![]);
        let report = evaluate_with_defaults(&p, "do something", &[]);
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(!report.l1_passed);
        assert!(report.remand_reason.is_some());
    }

    #[test]
    fn cycle_fails_l1() {
        let p = plan(vec![
            PlannedTask { task_id: "t1".into(), goal: "a".into(), depends_on: vec!["t2".into()] },
            PlannedTask { task_id: "t2".into(), goal: "b".into(), depends_on: vec!["t1".into()] },
        ]);
        let report = evaluate_with_defaults(&p, "a and b", &[]);
        assert_eq!(report.verdict, Verdict::Fail);
    }

    #[test]
    fn poor_goal_coverage_yields_conditional_pass() {
        let p = plan(vec![PlannedTask {
            task_id: "t1".into(),
            goal: "unrelated busywork".into(),
            depends_on: vec![],
        }]);
        let report =
            evaluate_with_defaults(&p, "migrate the billing database to postgres safely", &[]);
        assert_eq!(report.verdict, Verdict::ConditionalPass);
        assert!(report.l1_passed);
        assert!(!report.l2_passed);
    }

    #[test]
    fn custom_rule_set_can_narrow_to_l1_only() {
        let p = plan(vec![PlannedTask { task_id: "t1".into(), goal: "x".into(), depends_on: vec![] }]);
        let rules: Vec<Box<dyn Rule>> = vec![Box::new(NonEmptyPlanRule)];
        let report = evaluate(&p, "totally unrelated goal text", &[], &rules);
        assert_eq!(report.verdict, Verdict::Pass);
    }
}
