//! Rule evaluation over resolved metrics.
//!
//! Evaluation is fail-closed: an unresolved metric, a type mismatch between
//! metric and clause value, or an ordering operator on a non-number all make
//! the clause fail. Nothing here returns an error.

use serde::Serialize;

use super::constitution::{ClauseValue, Combinator, Constitution, Operator, Rule};
use super::context::{MetricSource, MetricValue};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of evaluating one clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseOutcome {
    pub metric: String,
    pub operator: Operator,
    pub expected: ClauseValue,
    /// Rendered actual value (`<unresolved>` when missing).
    pub actual: String,
    pub held: bool,
}

/// Result of evaluating a rule group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub passed: bool,
    pub clauses: Vec<ClauseOutcome>,
}

impl RuleOutcome {
    fn unknown(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            passed: false,
            clauses: Vec::new(),
        }
    }

    /// Clauses that did not hold.
    pub fn failed_clauses(&self) -> impl Iterator<Item = &ClauseOutcome> {
        self.clauses.iter().filter(|c| !c.held)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Evaluates rule groups of one constitution.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    constitution: Constitution,
}

impl RuleEngine {
    pub fn new(constitution: Constitution) -> Self {
        Self { constitution }
    }

    pub fn constitution(&self) -> &Constitution {
        &self.constitution
    }

    /// Evaluate a named rule group. Unknown ids never pass.
    pub fn evaluate_group(&self, rule_id: &str, source: &dyn MetricSource) -> RuleOutcome {
        match self.constitution.rule(rule_id) {
            Some(rule) => evaluate(rule, source),
            None => RuleOutcome::unknown(rule_id),
        }
    }
}

/// Evaluate one rule against a metric source.
///
/// Every clause is evaluated (no short-circuit) so the outcome can explain
/// itself. An empty clause list never passes.
pub fn evaluate(rule: &Rule, source: &dyn MetricSource) -> RuleOutcome {
    let clauses: Vec<ClauseOutcome> = rule
        .conditions
        .clauses
        .iter()
        .map(|clause| {
            let actual = source.resolve(&clause.metric);
            ClauseOutcome {
                metric: clause.metric.clone(),
                operator: clause.operator,
                expected: clause.value.clone(),
                held: compare(&actual, clause.operator, &clause.value),
                actual: actual.to_string(),
            }
        })
        .collect();

    let passed = !clauses.is_empty()
        && match rule.conditions.combinator {
            Combinator::All => clauses.iter().all(|c| c.held),
            Combinator::Any => clauses.iter().any(|c| c.held),
        };

    RuleOutcome {
        rule_id: rule.rule_id.clone(),
        passed,
        clauses,
    }
}

/// Compare a resolved metric against an expected value.
pub fn compare(actual: &MetricValue, op: Operator, expected: &ClauseValue) -> bool {
    match (actual, expected) {
        (MetricValue::Number(a), ClauseValue::Number(b)) => {
            if a.is_nan() || b.is_nan() {
                return false;
            }
            match op {
                Operator::Equals => a == b,
                Operator::NotEquals => a != b,
                Operator::LessThan => a < b,
                Operator::LessThanOrEqual => a <= b,
                Operator::GreaterThan => a > b,
                Operator::GreaterThanOrEqual => a >= b,
            }
        }
        (MetricValue::Bool(a), ClauseValue::Bool(b)) => equality(a == b, op),
        (MetricValue::Text(a), ClauseValue::Text(b)) => equality(a == b, op),
        _ => false,
    }
}

fn equality(equal: bool, op: Operator) -> bool {
    match op {
        Operator::Equals => equal,
        Operator::NotEquals => !equal,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::constitution::{Clause, DEFAULT_PASS, OVERRIDE_GATE};
    use crate::governance::context::{GovernanceContext, OverrideFlags};

    struct Fixed(Vec<(&'static str, MetricValue)>);

    impl MetricSource for Fixed {
        fn resolve(&self, metric: &str) -> MetricValue {
            self.0
                .iter()
                .find(|(k, _)| *k == metric)
                .map(|(_, v)| v.clone())
                .unwrap_or(MetricValue::Unresolved)
        }
    }

    #[test]
    fn numeric_operators() {
        let n = MetricValue::Number(0.05);
        assert!(compare(&n, Operator::LessThanOrEqual, &ClauseValue::Number(0.05)));
        assert!(!compare(&n, Operator::LessThan, &ClauseValue::Number(0.05)));
        assert!(compare(&n, Operator::GreaterThan, &ClauseValue::Number(0.01)));
        assert!(compare(&n, Operator::NotEquals, &ClauseValue::Number(0.01)));
        assert!(!compare(
            &MetricValue::Number(f64::NAN),
            Operator::NotEquals,
            &ClauseValue::Number(1.0)
        ));
    }

    #[test]
    fn non_numeric_ordering_fails() {
        let b = MetricValue::Bool(true);
        assert!(compare(&b, Operator::Equals, &ClauseValue::Bool(true)));
        assert!(!compare(&b, Operator::GreaterThanOrEqual, &ClauseValue::Bool(true)));
        let t = MetricValue::Text("admin".into());
        assert!(compare(&t, Operator::NotEquals, &ClauseValue::Text("user".into())));
        assert!(!compare(&t, Operator::LessThan, &ClauseValue::Text("b".into())));
    }

    #[test]
    fn type_mismatch_and_unresolved_fail() {
        assert!(!compare(
            &MetricValue::Bool(true),
            Operator::Equals,
            &ClauseValue::Number(1.0)
        ));
        assert!(!compare(
            &MetricValue::Unresolved,
            Operator::NotEquals,
            &ClauseValue::Bool(false)
        ));
    }

    #[test]
    fn all_and_any() {
        let src = Fixed(vec![
            ("A", MetricValue::Bool(true)),
            ("B", MetricValue::Bool(false)),
        ]);
        let mut rule = Rule::all("R", vec![Clause::is_true("A"), Clause::is_true("B")]);
        let out = evaluate(&rule, &src);
        assert!(!out.passed);
        assert_eq!(out.failed_clauses().count(), 1);
        rule.conditions.combinator = Combinator::Any;
        assert!(evaluate(&rule, &src).passed);
    }

    #[test]
    fn empty_clause_list_never_passes() {
        let src = Fixed(vec![]);
        let mut rule = Rule::all("R", vec![]);
        assert!(!evaluate(&rule, &src).passed);
        rule.conditions.combinator = Combinator::Any;
        assert!(!evaluate(&rule, &src).passed);
    }

    #[test]
    fn unknown_group_fails() {
        let engine = RuleEngine::new(Constitution::builtin());
        let out = engine.evaluate_group("NOPE", &Fixed(vec![]));
        assert!(!out.passed);
        assert!(out.clauses.is_empty());
    }

    #[test]
    fn default_pass_fails_closed_without_externally_legal() {
        let engine = RuleEngine::new(Constitution::builtin());
        let src = Fixed(vec![
            ("Universalizable", MetricValue::Bool(true)),
            ("RiskHeadroom", MetricValue::Number(0.05)),
            ("AssessmentConfidence", MetricValue::Number(0.8)),
            ("SustainIndex", MetricValue::Number(1.0)),
        ]);
        let out = engine.evaluate_group(DEFAULT_PASS, &src);
        assert!(!out.passed);
        let failed: Vec<_> = out.failed_clauses().map(|c| c.metric.as_str()).collect();
        assert_eq!(failed, vec!["ExternallyLegal"]);
        assert_eq!(out.clauses[0].actual, "<unresolved>");
    }

    #[test]
    fn override_gate_needs_every_flag() {
        let engine = RuleEngine::new(Constitution::builtin());
        let mut flags = OverrideFlags::granted();
        let ctx = GovernanceContext::new("ops").with_overrides(flags.clone());
        assert!(engine.evaluate_group(OVERRIDE_GATE, &ctx).passed);

        flags.override_peer_review = None;
        let ctx = GovernanceContext::new("ops").with_overrides(flags);
        assert!(!engine.evaluate_group(OVERRIDE_GATE, &ctx).passed);
    }
}
