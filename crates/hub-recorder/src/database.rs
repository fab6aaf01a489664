//! SQLite connection handle

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::{RecorderError, RecorderResult};
use crate::migrations;

/// Location string that opens a private in-memory database
pub const MEMORY: &str = ":memory:";

/// Shared database handle
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open a database from a configured location (`:memory:` or a file path)
    pub fn open(location: &str) -> RecorderResult<Self> {
        if location == MEMORY {
            Self::open_in_memory()
        } else {
            Self::open_at(location)
        }
    }

    /// Open the database at a specific path.
    ///
    /// Creates the file and runs migrations if necessary.
    pub fn open_at(path: impl AsRef<Path>) -> RecorderResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // WAL lets readers proceed alongside the single writer
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened database");

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        db.migrate()?;

        info!(path = %path.display(), "automation hub database initialised");
        Ok(db)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> RecorderResult<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        db.migrate()?;

        Ok(db)
    }

    /// Path of the database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the current schema version.
    pub fn schema_version(&self) -> RecorderResult<i32> {
        self.with_conn(|conn| migrations::get_version(conn))
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_conn<T, E>(&self, f: impl FnOnce(&mut Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<RecorderError>,
    {
        let mut conn = self.conn.lock().map_err(|_| RecorderError::Poisoned)?;
        f(&mut conn)
    }

    fn migrate(&self) -> RecorderResult<()> {
        self.with_conn(|conn| migrations::run(conn))
    }
}

/// Timestamp format stored in every table
///
/// Fixed-width UTC with microseconds, so lexical order is time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_ts(table: &'static str, raw: &str) -> RecorderResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RecorderError::InvalidRow {
            table,
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version().unwrap() > 0);
        assert!(db.path().is_none());
    }

    #[test]
    fn test_open_memory_location() {
        let db = Database::open(MEMORY).unwrap();
        assert!(db.path().is_none());
    }

    #[test]
    fn test_reopen_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("hub.db");

        {
            let db = Database::open_at(&db_path).unwrap();
            assert!(db.schema_version().unwrap() > 0);
        }

        // Reopen - migrations are not re-run
        let db = Database::open_at(&db_path).unwrap();
        assert_eq!(db.schema_version().unwrap(), migrations::CURRENT_VERSION);
        assert!(db_path.exists());
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let raw = format_ts(now);
        let parsed = parse_ts("test", &raw).unwrap();

        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
        assert!(parse_ts("test", "yesterday").is_err());
    }
}
