//! Fact-derived risk metrics (the v3 pragmatic risk model).
//!
//! Rules compare thresholds like `RiskHeadroom >= 0`; this module turns a
//! classified fact plus its context into those numbers. The acceptable harm
//! depends on who is asking, so the estimate carries its own threshold.

use serde::Serialize;

use crate::statement::{Domain, ParsedStatement};

use super::classify::OperationKind;
use super::context::{ADMIN_ROLE, GovernanceContext, MetricSource, MetricValue};

/// Source tag whose submissions carry reduced risk.
pub const TRUSTED_SYSTEM_SOURCE: &str = "trusted_system";

const TRUSTED_SYSTEM_FACTOR: f64 = 0.5;
const ADMIN_FACTOR: f64 = 0.7;
const BULK_FACTOR: f64 = 1.5;
const EMERGENCY_FACTOR: f64 = 0.3;
const UNIVERSALIZABLE_THRESHOLD: f64 = 0.3;

/// Harm ceilings per caller.
pub const DEFAULT_RISK_THRESHOLD: f64 = 0.05;
pub const TRUSTED_RISK_THRESHOLD: f64 = 0.10;
pub const ADMIN_RISK_THRESHOLD: f64 = 0.20;
pub const EMERGENCY_RISK_THRESHOLD: f64 = 0.50;

/// Assessment confidence the built-in rules require.
pub const MIN_ASSESSMENT_CONFIDENCE: f64 = 0.60;

const BASE_CONFIDENCE: f64 = 0.8;
const TRUSTED_CONFIDENCE_BONUS: f64 = 0.1;
const ADMIN_CONFIDENCE_BONUS: f64 = 0.05;
const BULK_CONFIDENCE_PENALTY: f64 = 0.1;
const EMERGENCY_CONFIDENCE_PENALTY: f64 = 0.2;

fn base_harm(kind: OperationKind) -> f64 {
    match kind {
        OperationKind::Add => 0.01,
        OperationKind::Delete => 0.05,
        OperationKind::Override => 0.10,
    }
}

fn base_sustain(kind: OperationKind) -> f64 {
    match kind {
        OperationKind::Add => 0.95,
        OperationKind::Delete => 0.85,
        OperationKind::Override => 0.70,
    }
}

fn universalizability(kind: OperationKind) -> f64 {
    match kind {
        OperationKind::Add => 0.8,
        OperationKind::Override => 0.6,
        OperationKind::Delete => 0.4,
    }
}

fn is_trusted(ctx: &GovernanceContext) -> bool {
    ctx.source.as_deref() == Some(TRUSTED_SYSTEM_SOURCE)
}

/// Harm ceiling for this caller: emergency, then admin, then trusted source.
pub fn risk_threshold(ctx: &GovernanceContext) -> f64 {
    if ctx.emergency_mode {
        EMERGENCY_RISK_THRESHOLD
    } else if ctx.user_role.as_deref() == Some(ADMIN_ROLE) {
        ADMIN_RISK_THRESHOLD
    } else if is_trusted(ctx) {
        TRUSTED_RISK_THRESHOLD
    } else {
        DEFAULT_RISK_THRESHOLD
    }
}

/// How sure the estimator is of its own numbers, in `[0, 1]`.
pub fn assessment_confidence(ctx: &GovernanceContext) -> f64 {
    let mut confidence = BASE_CONFIDENCE;
    if is_trusted(ctx) {
        confidence += TRUSTED_CONFIDENCE_BONUS;
    }
    if ctx.user_role.as_deref() == Some(ADMIN_ROLE) {
        confidence += ADMIN_CONFIDENCE_BONUS;
    }
    if ctx.bulk_operation {
        confidence -= BULK_CONFIDENCE_PENALTY;
    }
    if ctx.emergency_mode {
        confidence -= EMERGENCY_CONFIDENCE_PENALTY;
    }
    confidence.clamp(0.0, 1.0)
}

/// Metrics estimated for one fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactMetrics {
    pub kind: OperationKind,
    pub predicate: String,
    pub arg_count: usize,
    pub domain: Domain,
    pub harm_human_prob: f64,
    pub risk_threshold: f64,
    pub assessment_confidence: f64,
    pub sustain_index: f64,
    pub universalizability: f64,
    pub universalizable: bool,
}

impl FactMetrics {
    pub fn estimate(
        parsed: &ParsedStatement,
        kind: OperationKind,
        ctx: &GovernanceContext,
    ) -> Self {
        let mut multiplier = 1.0;
        if is_trusted(ctx) {
            multiplier *= TRUSTED_SYSTEM_FACTOR;
        }
        if ctx.user_role.as_deref() == Some(ADMIN_ROLE) {
            multiplier *= ADMIN_FACTOR;
        }
        if ctx.bulk_operation {
            multiplier *= BULK_FACTOR;
        }
        if ctx.emergency_mode {
            multiplier *= EMERGENCY_FACTOR;
        }

        let universalizability = universalizability(kind);

        Self {
            kind,
            predicate: parsed.predicate.clone(),
            arg_count: parsed.arity(),
            domain: parsed.domain(),
            harm_human_prob: (base_harm(kind) * multiplier).min(1.0),
            risk_threshold: risk_threshold(ctx),
            assessment_confidence: assessment_confidence(ctx),
            sustain_index: base_sustain(kind),
            universalizability,
            universalizable: universalizability >= UNIVERSALIZABLE_THRESHOLD,
        }
    }

    /// Threshold minus harm; negative means too risky for this caller.
    pub fn risk_headroom(&self) -> f64 {
        self.risk_threshold - self.harm_human_prob
    }
}

/// Context and fact metrics seen together by the rule engine.
pub struct EvaluationInput<'a> {
    pub context: &'a GovernanceContext,
    pub fact: &'a FactMetrics,
}

impl MetricSource for EvaluationInput<'_> {
    fn resolve(&self, metric: &str) -> MetricValue {
        match metric {
            "HarmHumanProb" => MetricValue::Number(self.fact.harm_human_prob),
            "RiskThreshold" => MetricValue::Number(self.fact.risk_threshold),
            "RiskHeadroom" => MetricValue::Number(self.fact.risk_headroom()),
            "AssessmentConfidence" => MetricValue::Number(self.fact.assessment_confidence),
            "SustainIndex" => MetricValue::Number(self.fact.sustain_index),
            "Universalizable" => MetricValue::Bool(self.fact.universalizable),
            "Fact.Predicate" => MetricValue::Text(self.fact.predicate.clone()),
            "Fact.ArgCount" => MetricValue::Number(self.fact.arg_count as f64),
            "Fact.Domain" => MetricValue::Text(self.fact.domain.as_str().to_string()),
            "Fact.Kind" => MetricValue::Text(self.fact.kind.as_str().to_string()),
            _ => self.context.resolve(metric),
        }
    }
}
