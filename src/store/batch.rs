//! One governed batch: a single SQLite transaction.
//!
//! Dropping a [`StagedBatch`] without committing rolls it back, so an early
//! `?` return leaves nothing behind.

use rusqlite::{Transaction, params};

use crate::error::StoreError;
use crate::statement::{Domain, ParsedStatement};

use super::StoreResult;

/// A fact ready to be staged.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    /// Canonical statement text; the uniqueness key.
    pub statement: String,
    pub predicate: String,
    pub arguments: Vec<String>,
    pub domain: Domain,
    pub source: Option<String>,
    pub confidence: f64,
}

impl NewFact {
    pub fn from_parsed(parsed: &ParsedStatement) -> Self {
        Self {
            statement: parsed.canonical(),
            predicate: parsed.predicate.clone(),
            arguments: parsed.arguments.clone(),
            domain: parsed.domain(),
            source: None,
            confidence: 1.0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Result of staging one insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Inserted inside the open transaction with this row id.
    Staged(i64),
    /// The statement already exists (or was staged earlier in this batch).
    Duplicate,
}

/// Open write transaction collecting staged inserts.
pub struct StagedBatch<'c> {
    tx: Transaction<'c>,
    staged: Vec<i64>,
}

impl<'c> StagedBatch<'c> {
    pub(crate) fn new(tx: Transaction<'c>) -> Self {
        Self {
            tx,
            staged: Vec::new(),
        }
    }

    /// Insert `fact` inside the transaction.
    ///
    /// A unique-constraint hit is reported as [`StageOutcome::Duplicate`]; any
    /// other database error is returned and the caller must abandon the batch.
    pub fn stage_insert(&mut self, fact: &NewFact) -> StoreResult<StageOutcome> {
        let args_json =
            serde_json::to_string(&fact.arguments).map_err(|e| StoreError::Serialization {
                message: format!("args_json for {}: {e}", fact.statement),
            })?;
        let created_at = chrono::Utc::now().to_rfc3339();

        let result = self.tx.execute(
            "INSERT INTO facts_extended
                (statement, predicate, arg_count, args_json, domain, source, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                fact.statement,
                fact.predicate,
                fact.arguments.len() as i64,
                args_json,
                fact.domain.as_str(),
                fact.source,
                fact.confidence,
                created_at,
            ],
        );

        match result {
            Ok(_) => {
                let id = self.tx.last_insert_rowid();
                self.staged.push(id);
                Ok(StageOutcome::Staged(id))
            }
            Err(e) if is_unique_violation(&e) => Ok(StageOutcome::Duplicate),
            Err(e) => Err(StoreError::sqlite("stage insert")(e)),
        }
    }

    /// Row ids staged so far.
    pub fn staged(&self) -> &[i64] {
        &self.staged
    }

    /// Commit every staged insert; returns how many rows were inserted.
    pub fn commit(self) -> StoreResult<usize> {
        let count = self.staged.len();
        self.tx.commit().map_err(StoreError::sqlite("commit"))?;
        Ok(count)
    }

    /// Discard every staged insert.
    pub fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().map_err(StoreError::sqlite("rollback"))
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
