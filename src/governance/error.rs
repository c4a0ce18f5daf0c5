//! Error types for the governance subsystem.
//!
//! Evaluation itself never fails: a missing metric fails its clause, and an
//! unparseable fact is denied. These errors arise while loading a constitution
//! document, decoding a JSON context, or when the write guard refuses a caller.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from loading or validating a constitution.
#[derive(Debug, Error, Diagnostic)]
pub enum GovernanceError {
    #[error("failed to read constitution at {path}")]
    #[diagnostic(
        code(hakgal::governance::constitution_read),
        help("Check the `constitution_path` setting, or remove it to use the built-in constitution.")
    )]
    ConstitutionRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid constitution JSON: {message}")]
    #[diagnostic(
        code(hakgal::governance::constitution_parse),
        help(
            "A constitution needs a `version` and a `rules` list. Each rule has a `rule_id` \
             and `conditions` with `type` (ALL or ANY) and `clauses` of metric/operator/value."
        )
    )]
    ConstitutionParse { message: String },

    #[error("constitution is missing required rule group '{rule_id}'")]
    #[diagnostic(
        code(hakgal::governance::missing_rule),
        help("The gate evaluates DEFAULT_PASS and OVERRIDE_GATE; both must be defined.")
    )]
    MissingRule { rule_id: String },

    #[error("constitution defines rule group '{rule_id}' more than once")]
    #[diagnostic(
        code(hakgal::governance::duplicate_rule),
        help("Rule ids must be unique. Merge the clauses into a single rule.")
    )]
    DuplicateRule { rule_id: String },

    #[error("invalid governance context: {message}")]
    #[diagnostic(
        code(hakgal::governance::context),
        help(
            "Context keys are source, user_role, externally_legal, bypass_governance, \
             bypass_authorization, bulk_operation and confidence, with matching types."
        )
    )]
    InvalidContext { message: String },

    #[error("knowledge-base writes are disabled")]
    #[diagnostic(
        code(hakgal::governance::write_disabled),
        help("Set HAKGAL_WRITE_ENABLED=true to allow write commands.")
    )]
    WriteDisabled,

    #[error("write token missing or incorrect")]
    #[diagnostic(
        code(hakgal::governance::write_token),
        help("HAKGAL_WRITE_TOKEN is set; pass the same value with --token.")
    )]
    WriteTokenMismatch,
}

/// Result type for governance operations.
pub type GovernanceResult<T> = std::result::Result<T, GovernanceError>;
