//! The governance gate: one allow/deny decision per fact.
//!
//! Decision order:
//!
//! 1. parse; unparseable input is denied
//! 2. schema limits
//! 3. classify (ADD / DELETE / OVERRIDE)
//! 4. bypass (process flag, or context flag with a non-empty authorization)
//! 5. `DEFAULT_PASS`, then `OVERRIDE_GATE` if the default group failed
//! 6. DELETE additionally requires the admin role
//!
//! The gate has no side effects. Logging and auditing belong to the caller.

use std::fmt::Write as _;

use serde::Serialize;

use crate::statement::{self, ParsedStatement, SchemaLimits};

use super::classify::{OperationClassifier, OperationKind, PrefixClassifier};
use super::constitution::{Constitution, DEFAULT_PASS, OVERRIDE_GATE};
use super::context::GovernanceContext;
use super::metrics::{EvaluationInput, FactMetrics};
use super::rule_engine::{RuleEngine, RuleOutcome};
use super::settings::GovernanceConfig;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why the gate decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Bypass,
    DefaultPass,
    OverrideGate,
    RulesFailed,
    RoleInsufficient,
    UnparseableStatement,
    SchemaViolation,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bypass => "bypass",
            Self::DefaultPass => "default_pass",
            Self::OverrideGate => "override_gate",
            Self::RulesFailed => "rules_failed",
            Self::RoleInsufficient => "role_insufficient",
            Self::UnparseableStatement => "unparseable_statement",
            Self::SchemaViolation => "schema_violation",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which switch activated a bypass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum BypassSource {
    /// `GOVERNANCE_BYPASS` was truthy.
    Environment,
    /// Per-call context flag with this authorization.
    Context { authorization: String },
}

/// Outcome of [`GovernanceGate::decide`].
#[derive(Debug, Clone, Serialize)]
pub struct GateDecision {
    pub allow: bool,
    pub reason: DecisionReason,
    /// `None` only for unparseable input.
    pub classification: Option<OperationKind>,
    pub statement: Option<ParsedStatement>,
    pub bypass: Option<BypassSource>,
    /// Extra detail, e.g. which schema limit was broken.
    pub detail: Option<String>,
    pub rules: Vec<RuleOutcome>,
    pub metrics: Option<FactMetrics>,
    pub policy_version: String,
    pub policy_hash: String,
}

impl GateDecision {
    pub fn is_bypass(&self) -> bool {
        self.bypass.is_some()
    }

    /// Canonical statement text, when the input parsed.
    pub fn canonical(&self) -> Option<String> {
        self.statement.as_ref().map(ParsedStatement::canonical)
    }

    /// Human-readable summary of the decision.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let verdict = if self.allow { "ALLOWED" } else { "BLOCKED" };
        let _ = writeln!(out, "{verdict} ({})", self.reason);
        if let Some(stmt) = &self.statement {
            let _ = writeln!(out, "  statement:      {}", stmt.canonical());
        }
        if let Some(kind) = self.classification {
            let _ = writeln!(out, "  classification: {kind}");
        }
        if let Some(detail) = &self.detail {
            let _ = writeln!(out, "  detail:         {detail}");
        }
        match &self.bypass {
            Some(BypassSource::Environment) => {
                let _ = writeln!(out, "  bypass:         GOVERNANCE_BYPASS");
            }
            Some(BypassSource::Context { authorization }) => {
                let _ = writeln!(out, "  bypass:         context ({authorization})");
            }
            None => {}
        }
        if let Some(m) = &self.metrics {
            let _ = writeln!(
                out,
                "  metrics:        HarmHumanProb={:.4} (ceiling {:.2}) AssessmentConfidence={:.2} \
                 SustainIndex={:.2} Universalizable={} domain={}",
                m.harm_human_prob,
                m.risk_threshold,
                m.assessment_confidence,
                m.sustain_index,
                m.universalizable,
                m.domain
            );
        }
        for rule in &self.rules {
            let mark = if rule.passed { "pass" } else { "fail" };
            let _ = writeln!(out, "  rule {}: {mark}", rule.rule_id);
            for clause in rule.failed_clauses() {
                let _ = writeln!(
                    out,
                    "    {} {} {} (actual {})",
                    clause.metric,
                    clause.operator.symbol(),
                    clause.expected,
                    clause.actual
                );
            }
        }
        let _ = write!(
            out,
            "  policy:         v{} #{}",
            self.policy_version, self.policy_hash
        );
        out
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

pub struct GovernanceGate {
    rules: RuleEngine,
    classifier: Box<dyn OperationClassifier>,
    limits: SchemaLimits,
}

impl GovernanceGate {
    /// Gate over `constitution` with the prefix classifier and default limits.
    pub fn new(constitution: Constitution) -> Self {
        Self {
            rules: RuleEngine::new(constitution),
            classifier: Box::new(PrefixClassifier::default()),
            limits: SchemaLimits::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn OperationClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_limits(mut self, limits: SchemaLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn constitution(&self) -> &Constitution {
        self.rules.constitution()
    }

    pub fn limits(&self) -> &SchemaLimits {
        &self.limits
    }

    /// Decide whether `fact` may be stored.
    pub fn decide(
        &self,
        fact: &str,
        ctx: &GovernanceContext,
        config: &GovernanceConfig,
    ) -> GateDecision {
        let constitution = self.rules.constitution();
        let mut decision = GateDecision {
            allow: false,
            reason: DecisionReason::UnparseableStatement,
            classification: None,
            statement: None,
            bypass: None,
            detail: None,
            rules: Vec::new(),
            metrics: None,
            policy_version: constitution.version.clone(),
            policy_hash: constitution.policy_hash().to_string(),
        };

        let parsed = statement::parse(fact);
        if !parsed.is_parseable() {
            return decision;
        }
        if let Some(violation) = self.limits.violation(&parsed) {
            decision.reason = DecisionReason::SchemaViolation;
            decision.detail = Some(violation);
            decision.statement = Some(parsed);
            return decision;
        }

        let kind = self.classifier.classify(&parsed.predicate);
        let metrics = FactMetrics::estimate(&parsed, kind, ctx);
        decision.classification = Some(kind);
        decision.statement = Some(parsed);

        let bypass = if config.bypass {
            Some(BypassSource::Environment)
        } else if ctx.bypass_requested() {
            ctx.authorization().map(|auth| BypassSource::Context {
                authorization: auth.to_string(),
            })
        } else {
            None
        };
        if bypass.is_some() {
            decision.allow = true;
            decision.reason = DecisionReason::Bypass;
            decision.bypass = bypass;
            decision.metrics = Some(metrics);
            return decision;
        }

        let input = EvaluationInput {
            context: ctx,
            fact: &metrics,
        };
        let default_pass = self.rules.evaluate_group(DEFAULT_PASS, &input);
        let passed_by = if default_pass.passed {
            decision.rules.push(default_pass);
            Some(DecisionReason::DefaultPass)
        } else {
            let override_gate = self.rules.evaluate_group(OVERRIDE_GATE, &input);
            let passed = override_gate.passed;
            decision.rules.push(default_pass);
            decision.rules.push(override_gate);
            passed.then_some(DecisionReason::OverrideGate)
        };
        decision.metrics = Some(metrics);

        match passed_by {
            None => decision.reason = DecisionReason::RulesFailed,
            Some(_) if kind == OperationKind::Delete && !ctx.is_admin() => {
                decision.reason = DecisionReason::RoleInsufficient;
            }
            Some(reason) => {
                decision.allow = true;
                decision.reason = reason;
            }
        }
        decision
    }
}

impl std::fmt::Debug for GovernanceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceGate")
            .field("policy_version", &self.rules.constitution().version)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
