//! Schema migrations.
//!
//! Each migration upgrades the schema by one version; the version is kept
//! in `PRAGMA user_version`. Migrations run when the database is opened.

use rusqlite::Connection;

use crate::error::{RecorderError, RecorderResult};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Get the current schema version; 0 for a new database.
pub fn get_version(conn: &Connection) -> RecorderResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_version(conn: &Connection, version: i32) -> RecorderResult<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}

/// Run all pending migrations, each in its own transaction.
pub fn run(conn: &mut Connection) -> RecorderResult<()> {
    let current = get_version(conn)?;

    for version in (current + 1)..=CURRENT_VERSION {
        let tx = conn.transaction()?;
        run_migration(&tx, version)?;
        set_version(&tx, version)?;
        tx.commit()?;
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> RecorderResult<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(RecorderError::UnknownMigration(version)),
    }
}

/// Migration v1: initial schema.
///
/// - `rules`: rule definitions keyed by name; `seq` is the creation order
/// - `executions`: append-only ledger of rule-fire attempts
/// - `logs`: messages written by `log_message` actions and rule management
fn migrate_v1(conn: &Connection) -> RecorderResult<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS rules (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL UNIQUE,
            definition      TEXT NOT NULL,
            trigger_type    TEXT NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            priority        INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            last_triggered  TEXT,
            trigger_count   INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_rules_route
            ON rules(trigger_type, enabled, priority DESC, seq);

        CREATE TABLE IF NOT EXISTS executions (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            cycle_id        TEXT NOT NULL,
            rule_name       TEXT NOT NULL,
            triggered_by    TEXT NOT NULL,
            context         TEXT NOT NULL DEFAULT '{}',
            result          TEXT NOT NULL DEFAULT 'ok',
            error           TEXT,
            actions         TEXT NOT NULL DEFAULT '[]',
            ts              TEXT NOT NULL,
            duration_ms     REAL NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_exec_rule ON executions(rule_name, ts);
        CREATE INDEX IF NOT EXISTS idx_exec_ts ON executions(ts);

        CREATE TABLE IF NOT EXISTS logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            level           TEXT NOT NULL DEFAULT 'INFO',
            message         TEXT NOT NULL,
            context         TEXT NOT NULL DEFAULT '{}',
            ts              TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
