//! SQLite schema and connection settings.
//!
//! Schema creation is idempotent; every open runs it.

use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreError;

use super::StoreResult;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS facts_extended (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        statement   TEXT    NOT NULL UNIQUE,
        predicate   TEXT    NOT NULL,
        arg_count   INTEGER NOT NULL,
        args_json   TEXT    NOT NULL,
        domain      TEXT    NOT NULL DEFAULT 'general',
        source      TEXT,
        confidence  REAL    NOT NULL DEFAULT 1.0,
        created_at  TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_facts_predicate ON facts_extended(predicate);
    CREATE INDEX IF NOT EXISTS idx_facts_domain    ON facts_extended(domain);

    CREATE TABLE IF NOT EXISTS audit_log (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp   TEXT    NOT NULL,
        event       TEXT    NOT NULL,
        payload     TEXT    NOT NULL,
        hash        TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_audit_event ON audit_log(event);
";

/// WAL journal, `synchronous=NORMAL`, busy timeout.
///
/// Returns the journal mode SQLite actually chose (`memory` for in-memory
/// databases).
pub(crate) fn configure(conn: &Connection) -> StoreResult<String> {
    // First, so the pragmas below wait on other writers instead of failing.
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(StoreError::sqlite("set busy_timeout"))?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(StoreError::sqlite("set journal_mode"))?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(StoreError::sqlite("set synchronous"))?;
    Ok(mode)
}

pub(crate) fn create(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA)
        .map_err(StoreError::sqlite("create schema"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        create(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('facts_extended', 'audit_log')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("kb.db")).unwrap();
        let mode = configure(&conn).unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
        let sync: i64 = conn
            .pragma_query_value(None, "synchronous", |r| r.get(0))
            .unwrap();
        // NORMAL
        assert_eq!(sync, 1);
    }
}
