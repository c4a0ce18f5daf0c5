//! Per-call governance context and metric resolution.
//!
//! A [`GovernanceContext`] is built fresh for every governed call and never
//! persisted; only the decision it leads to is audited. Rule clauses look up
//! named metrics through [`MetricSource::resolve`], which returns
//! [`MetricValue::Unresolved`] for anything it does not know.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Metric values
// ---------------------------------------------------------------------------

/// A resolved metric, or the sentinel for a metric that is not available.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Unresolved,
}

impl MetricValue {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    fn from_opt_bool(value: Option<bool>) -> Self {
        value.map_or(Self::Unresolved, Self::Bool)
    }

    fn from_opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::Unresolved, |s| Self::Text(s.to_string()))
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::Unresolved => f.write_str("<unresolved>"),
        }
    }
}

/// Anything rule clauses can resolve metrics against.
///
/// Paths are either bare (`ExternallyLegal`) or dotted (`Override.PeerReview`).
pub trait MetricSource {
    fn resolve(&self, metric: &str) -> MetricValue;
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Role string that may submit DELETE-classified facts.
pub const ADMIN_ROLE: &str = "admin";

/// The four sign-offs the override gate requires.
///
/// Field names follow the override rule metrics; the aliases accept the keys
/// older callers send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideFlags {
    #[serde(default, alias = "operator_override")]
    pub override_operator: Option<bool>,
    #[serde(default, alias = "peer_review")]
    pub override_peer_review: Option<bool>,
    #[serde(default, alias = "override_doc")]
    pub override_documentation: Option<bool>,
    #[serde(default, alias = "risk_exception_justified")]
    pub override_risk_exception_justified: Option<bool>,
}

impl OverrideFlags {
    /// All four sign-offs granted.
    pub fn granted() -> Self {
        Self {
            override_operator: Some(true),
            override_peer_review: Some(true),
            override_documentation: Some(true),
            override_risk_exception_justified: Some(true),
        }
    }

    fn resolve(&self, field: &str) -> MetricValue {
        match field {
            "Operator" => MetricValue::from_opt_bool(self.override_operator),
            "PeerReview" => MetricValue::from_opt_bool(self.override_peer_review),
            "Documentation" => MetricValue::from_opt_bool(self.override_documentation),
            "RiskExceptionJustified" => {
                MetricValue::from_opt_bool(self.override_risk_exception_justified)
            }
            _ => MetricValue::Unresolved,
        }
    }
}

/// Caller-supplied metadata for one governed call.
///
/// Deserializes from the JSON context dict MCP tools pass; unknown keys are
/// ignored. `Default` leaves `externally_legal` unset, which fails the default
/// rule group; [`GovernanceContext::new`] is the constructor for normal flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceContext {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
    #[serde(default)]
    pub externally_legal: Option<bool>,
    #[serde(default)]
    pub bypass_governance: bool,
    #[serde(default)]
    pub bypass_authorization: Option<String>,
    /// Informational; raises the estimated risk of the batch.
    #[serde(default)]
    pub bulk_operation: bool,
    /// Raises the acceptable harm ceiling and lowers assessment confidence.
    #[serde(default)]
    pub emergency_mode: bool,
    /// Confidence recorded on stored facts (default 1.0).
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub overrides: OverrideFlags,
}

impl GovernanceContext {
    /// Context for an ordinary submission: the given source, externally legal.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            externally_legal: Some(true),
            ..Default::default()
        }
    }

    /// Parse the JSON context dict.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = Some(role.into());
        self
    }

    pub fn with_externally_legal(mut self, legal: bool) -> Self {
        self.externally_legal = Some(legal);
        self
    }

    pub fn with_bypass(mut self, authorization: impl Into<String>) -> Self {
        self.bypass_governance = true;
        self.bypass_authorization = Some(authorization.into());
        self
    }

    pub fn with_bulk(mut self, bulk: bool) -> Self {
        self.bulk_operation = bulk;
        self
    }

    pub fn with_emergency(mut self, emergency: bool) -> Self {
        self.emergency_mode = emergency;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_overrides(mut self, overrides: OverrideFlags) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.user_role.as_deref() == Some(ADMIN_ROLE)
    }

    /// A per-call bypass needs both the flag and a non-empty authorization.
    pub fn bypass_requested(&self) -> bool {
        self.bypass_governance && self.authorization().is_some()
    }

    /// The trimmed, non-empty bypass authorization, if any.
    pub fn authorization(&self) -> Option<&str> {
        self.bypass_authorization
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Confidence for stored facts, clamped into `[0, 1]`.
    pub fn effective_confidence(&self) -> f64 {
        match self.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => 1.0,
        }
    }
}

impl MetricSource for GovernanceContext {
    fn resolve(&self, metric: &str) -> MetricValue {
        match metric.split_once('.') {
            Some(("Override", field)) => self.overrides.resolve(field),
            Some(("Context", field)) => self.resolve(field),
            Some(_) => MetricValue::Unresolved,
            None => match metric {
                "ExternallyLegal" => MetricValue::from_opt_bool(self.externally_legal),
                "Source" => MetricValue::from_opt_text(self.source.as_deref()),
                "UserRole" => MetricValue::from_opt_text(self.user_role.as_deref()),
                "BulkOperation" => MetricValue::Bool(self.bulk_operation),
                "EmergencyMode" => MetricValue::Bool(self.emergency_mode),
                _ => MetricValue::Unresolved,
            },
        }
    }
}
