//! Message log backed by the `logs` table

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{RecorderError, RecorderResult};

const TABLE: &str = "logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = RecorderError;

    /// Case-insensitive; `warn` is accepted for `WARNING`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(RecorderError::InvalidRow {
                table: TABLE,
                reason: format!("unknown log level {s:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LogBook {
    db: Database,
}

impl LogBook {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a message, returning its id
    pub fn append(&self, level: LogLevel, message: &str, context: &Value) -> RecorderResult<i64> {
        let context = serde_json::to_string(context)?;

        self.db.with_conn(|conn| -> RecorderResult<i64> {
            conn.execute(
                "INSERT INTO logs (level, message, context, ts) VALUES (?1, ?2, ?3, ?4)",
                params![level.as_str(), message, context, format_ts(Utc::now())],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The `limit` most recent messages, newest first
    pub fn recent(&self, limit: usize) -> RecorderResult<Vec<LogEntry>> {
        let rows = self.db.with_conn(
            |conn| -> RecorderResult<Vec<(i64, String, String, String, String)>> {
                let mut stmt = conn.prepare(
                    "SELECT id, level, message, context, ts FROM logs ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit as i64], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            },
        )?;

        rows.into_iter()
            .map(|(id, level, message, context, ts)| {
                Ok(LogEntry {
                    id,
                    level: level.parse()?,
                    message,
                    context: serde_json::from_str(&context)?,
                    timestamp: parse_ts(TABLE, &ts)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_and_recent() {
        let logbook = LogBook::new(Database::open_in_memory().unwrap());

        logbook
            .append(LogLevel::Info, "Rule added: morning", &json!({}))
            .unwrap();
        logbook
            .append(LogLevel::Warning, "door open", &json!({"rule": "door_watch"}))
            .unwrap();

        let entries = logbook.recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "door open");
        assert_eq!(entries[0].level, LogLevel::Warning);
        assert_eq!(entries[0].context["rule"], json!("door_watch"));
        assert_eq!(entries[1].message, "Rule added: morning");

        assert_eq!(logbook.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("Error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
