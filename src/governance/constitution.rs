//! Declarative constitution: named rule groups over metric clauses.
//!
//! A constitution is plain data. It is loaded once (from JSON or the built-in
//! v3 default) and stays immutable for the lifetime of the gate that owns it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{GovernanceError, GovernanceResult};
use super::metrics::MIN_ASSESSMENT_CONFIDENCE;

/// Rule group every ordinary fact must pass.
pub const DEFAULT_PASS: &str = "DEFAULT_PASS";
/// Rule group that lets a fact through when the default group fails.
pub const OVERRIDE_GATE: &str = "OVERRIDE_GATE";

// ---------------------------------------------------------------------------
// Clauses
// ---------------------------------------------------------------------------

/// Comparison applied between a resolved metric and a clause value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

/// Expected value on the right-hand side of a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClauseValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl std::fmt::Display for ClauseValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// `{metric, operator, value}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub metric: String,
    pub operator: Operator,
    pub value: ClauseValue,
}

impl Clause {
    pub fn new(metric: impl Into<String>, operator: Operator, value: ClauseValue) -> Self {
        Self {
            metric: metric.into(),
            operator,
            value,
        }
    }

    /// Shorthand for `metric == true`.
    pub fn is_true(metric: impl Into<String>) -> Self {
        Self::new(metric, Operator::Equals, ClauseValue::Bool(true))
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// How the clauses of a rule combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Combinator {
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(rename = "type")]
    pub combinator: Combinator,
    #[serde(default)]
    pub clauses: Vec<Clause>,
}

/// A named rule group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    #[serde(default)]
    pub description: String,
    pub conditions: Conditions,
}

impl Rule {
    pub fn all(rule_id: impl Into<String>, clauses: Vec<Clause>) -> Self {
        Self {
            rule_id: rule_id.into(),
            description: String::new(),
            conditions: Conditions {
                combinator: Combinator::All,
                clauses,
            },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Constitution
// ---------------------------------------------------------------------------

/// A versioned set of rule groups plus the hash of the document it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constitution {
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub rules: Vec<Rule>,
    #[serde(skip)]
    policy_hash: String,
}

impl Constitution {
    /// Parse and validate a constitution document.
    pub fn from_json(json: &str) -> GovernanceResult<Self> {
        let mut constitution: Self =
            serde_json::from_str(json).map_err(|e| GovernanceError::ConstitutionParse {
                message: e.to_string(),
            })?;
        constitution.validate()?;
        constitution.policy_hash = policy_hash(json.as_bytes());
        Ok(constitution)
    }

    /// Read a constitution document from disk.
    pub fn load(path: &Path) -> GovernanceResult<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| GovernanceError::ConstitutionRead {
                path: path.display().to_string(),
                source: e,
            })?;
        Self::from_json(&json)
    }

    /// The v3 constitution used when no document is configured.
    pub fn builtin() -> Self {
        let default_pass = Rule::all(
            DEFAULT_PASS,
            vec![
                Clause::is_true("ExternallyLegal"),
                Clause::is_true("Universalizable"),
                Clause::new(
                    "RiskHeadroom",
                    Operator::GreaterThanOrEqual,
                    ClauseValue::Number(0.0),
                ),
                Clause::new(
                    "AssessmentConfidence",
                    Operator::GreaterThanOrEqual,
                    ClauseValue::Number(MIN_ASSESSMENT_CONFIDENCE),
                ),
                Clause::new(
                    "SustainIndex",
                    Operator::GreaterThanOrEqual,
                    ClauseValue::Number(0.85),
                ),
            ],
        )
        .with_description(
            "Legal, universalizable, sustainable changes within the caller's harm ceiling pass.",
        );

        let override_gate = Rule::all(
            OVERRIDE_GATE,
            vec![
                Clause::is_true("ExternallyLegal"),
                Clause::is_true("Override.Operator"),
                Clause::is_true("Override.PeerReview"),
                Clause::is_true("Override.Documentation"),
                Clause::is_true("Override.RiskExceptionJustified"),
            ],
        )
        .with_description("Operator-approved, reviewed and documented exceptions.");

        let mut constitution = Self {
            version: "3.0".into(),
            description: "Built-in pragmatic governance constitution".into(),
            rules: vec![default_pass, override_gate],
            policy_hash: String::new(),
        };
        let bytes = serde_json::to_vec(&constitution).unwrap_or_default();
        constitution.policy_hash = policy_hash(&bytes);
        constitution
    }

    /// Look up a rule group by id.
    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.rule_id == rule_id)
    }

    /// First 12 hex characters of the SHA-256 of the source document.
    pub fn policy_hash(&self) -> &str {
        &self.policy_hash
    }

    fn validate(&self) -> GovernanceResult<()> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.rule_id.as_str()) {
                return Err(GovernanceError::DuplicateRule {
                    rule_id: rule.rule_id.clone(),
                });
            }
        }
        for required in [DEFAULT_PASS, OVERRIDE_GATE] {
            if !seen.contains(required) {
                return Err(GovernanceError::MissingRule {
                    rule_id: required.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn policy_hash(bytes: &[u8]) -> String {
    let mut hex = hex::encode(Sha256::digest(bytes));
    hex.truncate(12);
    hex
}
