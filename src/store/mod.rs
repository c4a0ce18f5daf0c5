//! SQLite-backed fact store.
//!
//! - [`schema`]: tables, indices and connection pragmas
//! - [`batch`]: [`StagedBatch`], the all-or-nothing write path
//!
//! [`FactStore`] owns the connection. Writes only happen through a batch;
//! everything else here is read-side.

pub mod batch;
pub mod schema;

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;

use crate::audit::AuditLog;
use crate::error::StoreError;
use crate::statement;

pub use batch::{NewFact, StageOutcome, StagedBatch};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A fact row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFact {
    pub id: i64,
    pub statement: String,
    pub predicate: String,
    pub arguments: Vec<String>,
    pub domain: String,
    pub source: Option<String>,
    pub confidence: f64,
    pub created_at: String,
}

const FACT_COLUMNS: &str =
    "id, statement, predicate, args_json, domain, source, confidence, created_at";

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredFact> {
    let args_json: String = row.get(3)?;
    let arguments: Vec<String> = serde_json::from_str(&args_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredFact {
        id: row.get(0)?,
        statement: row.get(1)?,
        predicate: row.get(2)?,
        arguments,
        domain: row.get(4)?,
        source: row.get(5)?,
        confidence: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Canonical lookup key: parseable input is normalized, anything else is used as-is.
fn lookup_key(text: &str) -> String {
    let parsed = statement::parse(text);
    if parsed.is_parseable() {
        parsed.canonical()
    } else {
        text.to_string()
    }
}

/// Fact database handle.
pub struct FactStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl FactStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io { source: e })?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        Ok(store)
    }

    /// Private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".into(),
            source: e,
        })?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        let journal_mode = schema::configure(&conn)?;
        schema::create(&conn)?;
        tracing::debug!(
            path = ?path,
            journal_mode = %journal_mode,
            "fact store ready"
        );
        Ok(Self { conn, path })
    }

    /// Underlying connection, for read-only inspection and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start a write batch. Takes the write lock immediately.
    pub fn begin_batch(&mut self) -> StoreResult<StagedBatch<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::sqlite("begin batch"))?;
        Ok(StagedBatch::new(tx))
    }

    /// Audit log sharing this connection.
    pub fn audit(&self) -> AuditLog<'_> {
        AuditLog::new(&self.conn)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, statement: &str) -> StoreResult<Option<StoredFact>> {
        self.conn
            .query_row(
                &format!("SELECT {FACT_COLUMNS} FROM facts_extended WHERE statement = ?1"),
                params![lookup_key(statement)],
                row_to_fact,
            )
            .optional()
            .map_err(StoreError::sqlite("get fact"))
    }

    pub fn contains(&self, statement: &str) -> StoreResult<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM facts_extended WHERE statement = ?1",
                params![lookup_key(statement)],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(StoreError::sqlite("contains"))
    }

    pub fn count(&self) -> StoreResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM facts_extended", [], |r| {
                r.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(StoreError::sqlite("count facts"))
    }

    /// Facts in insertion order.
    pub fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<StoredFact>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts_extended ORDER BY id LIMIT ?1 OFFSET ?2"
            ))
            .map_err(StoreError::sqlite("list facts"))?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], row_to_fact)
            .map_err(StoreError::sqlite("list facts"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::sqlite("list facts"))
    }

    pub fn by_predicate(&self, predicate: &str, limit: usize) -> StoreResult<Vec<StoredFact>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts_extended WHERE predicate = ?1 ORDER BY id LIMIT ?2"
            ))
            .map_err(StoreError::sqlite("facts by predicate"))?;
        let rows = stmt
            .query_map(params![predicate, limit as i64], row_to_fact)
            .map_err(StoreError::sqlite("facts by predicate"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::sqlite("facts by predicate"))
    }

    /// `(predicate, count)` pairs, most frequent first.
    pub fn predicate_counts(&self, limit: usize) -> StoreResult<Vec<(String, usize)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT predicate, COUNT(*) AS n FROM facts_extended
                 GROUP BY predicate ORDER BY n DESC, predicate LIMIT ?1",
            )
            .map_err(StoreError::sqlite("predicate counts"))?;
        let rows = stmt
            .query_map(params![limit as i64], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize))
            })
            .map_err(StoreError::sqlite("predicate counts"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::sqlite("predicate counts"))
    }
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
