//! Rich diagnostic error types for hakgal.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Governance denials, unparseable statements and duplicate facts are *not*
//! errors: they are ordinary per-fact outcomes reported by the engine. The only
//! hard failure of a governed batch is a [`StoreError`].

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::governance::GovernanceError;
use crate::paths::PathError;

/// Top-level error type for hakgal.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum HakError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("failed to open fact database at {path}")]
    #[diagnostic(
        code(hakgal::store::open),
        help(
            "Check that the parent directory exists and is writable, \
             and that no other tool holds an exclusive lock on the file."
        )
    )]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("sqlite error during {op}: {source}")]
    #[diagnostic(
        code(hakgal::store::sqlite),
        help(
            "The database rejected the operation. The whole batch was rolled back. \
             If this repeats, check free disk space and run `PRAGMA integrity_check`."
        )
    )]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(hakgal::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(hakgal::store::serde),
        help(
            "A stored column could not be encoded or decoded. \
             The row was probably written by an incompatible version."
        )
    )]
    Serialization { message: String },
}

impl StoreError {
    /// Wrap a rusqlite error with the name of the operation that failed.
    pub fn sqlite(op: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Sqlite { op, source }
    }
}

// ---------------------------------------------------------------------------
// Audit errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AuditError {
    #[error("failed to append audit entry '{event}': {source}")]
    #[diagnostic(
        code(hakgal::audit::write),
        help(
            "The audit log could not be written. Governed writes still commit; \
             check disk space and that the audit_log table exists."
        )
    )]
    Write {
        event: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to read audit log: {source}")]
    #[diagnostic(
        code(hakgal::audit::read),
        help("The audit_log table could not be queried. Run `hakgal init` to recreate the schema.")
    )]
    Read {
        #[source]
        source: rusqlite::Error,
    },

    #[error("audit payload could not be encoded: {message}")]
    #[diagnostic(
        code(hakgal::audit::payload),
        help("Audit payloads must be JSON-serializable.")
    )]
    Payload { message: String },
}

/// Convenience alias for functions returning hakgal results.
pub type HakResult<T> = std::result::Result<T, HakError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_hak_error() {
        let err = StoreError::Serialization {
            message: "bad args_json".into(),
        };
        let hak: HakError = err.into();
        assert!(matches!(hak, HakError::Store(StoreError::Serialization { .. })));
    }

    #[test]
    fn sqlite_helper_keeps_operation_name() {
        let err = StoreError::sqlite("commit")(rusqlite::Error::InvalidQuery);
        let msg = format!("{err}");
        assert!(msg.contains("commit"));
    }

    #[test]
    fn audit_error_display_names_event() {
        let err = AuditError::Write {
            event: "add_fact".into(),
            source: rusqlite::Error::InvalidQuery,
        };
        assert!(format!("{err}").contains("add_fact"));
    }
}
