//! Append-only, hash-chained audit log.
//!
//! Each entry stores `hash = sha256(prev_hash|timestamp|event|payload)`, with
//! `genesis` standing in for the hash before the first entry. Rewriting any
//! row breaks the chain from that row on, which [`AuditLog::verify_chain`]
//! reports.
//!
//! Audit writes are best-effort: callers log a failed [`AuditLog::record`] and
//! carry on. They are never part of the fact transaction. Each append reads the
//! chain head and inserts under its own IMMEDIATE transaction, so processes
//! sharing one database file extend a single chain.

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AuditError;
use crate::governance::OperationKind;

/// Result type for audit operations.
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Hash that precedes the first entry of a chain.
pub const GENESIS_HASH: &str = "genesis";

/// Source tag recorded for facts admitted through a bypass.
pub const BYPASS_SOURCE: &str = "BYPASS_MODE";

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AddFact,
    DeleteFact,
    OverrideFact,
    Bypass,
    GovernanceDenied,
    BatchRolledBack,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddFact => "add_fact",
            Self::DeleteFact => "delete_fact",
            Self::OverrideFact => "override_fact",
            Self::Bypass => "bypass",
            Self::GovernanceDenied => "governance_denied",
            Self::BatchRolledBack => "batch_rolled_back",
        }
    }

    /// Event for a committed fact.
    pub fn for_commit(kind: OperationKind, bypass: bool) -> Self {
        if bypass {
            return Self::Bypass;
        }
        match kind {
            OperationKind::Add => Self::AddFact,
            OperationKind::Delete => Self::DeleteFact,
            OperationKind::Override => Self::OverrideFact,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub event: String,
    pub payload: serde_json::Value,
    pub hash: String,
}

/// Result of walking the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub total: usize,
    pub valid: usize,
    /// Ids whose stored hash does not match the recomputed one.
    pub tampered: Vec<i64>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.tampered.is_empty()
    }
}

fn chain_hash(prev: &str, timestamp: &str, event: &str, payload: &str) -> String {
    hex::encode(Sha256::digest(
        format!("{prev}|{timestamp}|{event}|{payload}").as_bytes(),
    ))
}

/// Audit log view over a store connection.
pub struct AuditLog<'c> {
    conn: &'c Connection,
}

impl<'c> AuditLog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append one entry, chained to the previous one.
    pub fn record(
        &self,
        action: AuditAction,
        payload: &serde_json::Value,
    ) -> AuditResult<AuditEntry> {
        let event = action.as_str();
        let payload_text = serde_json::to_string(payload).map_err(|e| AuditError::Payload {
            message: e.to_string(),
        })?;
        let write_err = |source| AuditError::Write {
            event: event.to_string(),
            source,
        };

        // The write lock is held from the head read through the insert.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(write_err)?;

        let prev_hash: String = tx
            .query_row(
                "SELECT hash FROM audit_log ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(write_err)?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let timestamp = chrono::Utc::now().to_rfc3339();
        let hash = chain_hash(&prev_hash, &timestamp, event, &payload_text);

        tx.execute(
            "INSERT INTO audit_log (timestamp, event, payload, hash) VALUES (?1, ?2, ?3, ?4)",
            params![timestamp, event, payload_text, hash],
        )
        .map_err(write_err)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(write_err)?;

        Ok(AuditEntry {
            id,
            timestamp,
            event: event.to_string(),
            payload: payload.clone(),
            hash,
        })
    }

    pub fn count(&self) -> AuditResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |r| r.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(|source| AuditError::Read { source })
    }

    /// The most recent `limit` entries, oldest first.
    pub fn entries(&self, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        let read_err = |source| AuditError::Read { source };
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, event, payload, hash FROM (
                     SELECT * FROM audit_log ORDER BY id DESC LIMIT ?1
                 ) ORDER BY id ASC",
            )
            .map_err(read_err)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let payload: String = row.get(3)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    event: row.get(2)?,
                    payload: serde_json::from_str(&payload)
                        .unwrap_or(serde_json::Value::String(payload)),
                    hash: row.get(4)?,
                })
            })
            .map_err(read_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(read_err)
    }

    /// Recompute every hash in insertion order.
    pub fn verify_chain(&self) -> AuditResult<ChainReport> {
        let read_err = |source| AuditError::Read { source };
        let mut stmt = self
            .conn
            .prepare("SELECT id, timestamp, event, payload, hash FROM audit_log ORDER BY id ASC")
            .map_err(read_err)?;
        let rows: Vec<(i64, String, String, String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .map_err(read_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(read_err)?;

        let mut report = ChainReport::default();
        let mut prev = GENESIS_HASH.to_string();
        for (id, timestamp, event, payload, stored) in rows {
            report.total += 1;
            if chain_hash(&prev, &timestamp, &event, &payload) == stored {
                report.valid += 1;
            } else {
                report.tampered.push(id);
            }
            prev = stored;
        }
        Ok(report)
    }
}
