//! Execution ledger
//!
//! One [`ExecutionRecord`] is written per rule-fire attempt whose guard
//! conditions passed, whether its actions succeeded or not. Records are
//! append-only and never mutated after write.

use chrono::{DateTime, Duration, Utc};
use hub_core::TriggerKind;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{RecorderError, RecorderResult};

const TABLE: &str = "executions";

/// Outcome of one rule-fire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Ok,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Ok => "ok",
            ExecutionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(ExecutionStatus::Ok),
            "error" => Ok(ExecutionStatus::Error),
            other => Err(RecorderError::InvalidRow {
                table: TABLE,
                reason: format!("unknown result {other:?}"),
            }),
        }
    }
}

/// A stored execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    /// Groups the records written by one fire cycle
    pub cycle_id: String,
    pub rule_name: String,
    pub triggered_by: TriggerKind,
    /// Sanitized context snapshot
    pub context: Value,
    pub result: ExecutionStatus,
    pub error: Option<String>,
    /// Per-action outcomes, in execution order
    pub actions: Value,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
}

/// A record about to be appended
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub cycle_id: String,
    pub rule_name: String,
    pub triggered_by: TriggerKind,
    pub context: Value,
    pub result: ExecutionStatus,
    pub error: Option<String>,
    pub actions: Value,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
}

/// Append-only execution history backed by the `executions` table
#[derive(Debug, Clone)]
pub struct ExecutionLedger {
    db: Database,
}

impl ExecutionLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a record, returning its id
    #[instrument(skip(self, record), fields(rule = %record.rule_name, result = %record.result))]
    pub fn append(&self, record: &NewExecution) -> RecorderResult<i64> {
        let context = serde_json::to_string(&record.context)?;
        let actions = serde_json::to_string(&record.actions)?;

        let id = self.db.with_conn(|conn| -> RecorderResult<i64> {
            conn.execute(
                "INSERT INTO executions
                    (cycle_id, rule_name, triggered_by, context, result, error, actions, ts, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.cycle_id,
                    record.rule_name,
                    record.triggered_by.as_str(),
                    context,
                    record.result.as_str(),
                    record.error,
                    actions,
                    format_ts(record.timestamp),
                    record.duration_ms,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        debug!(id, "Execution recorded");
        Ok(id)
    }

    /// Records from the last `since_hours`, newest first
    ///
    /// A window reaching past the earliest representable time returns all
    /// history. A negative window returns nothing.
    pub fn history(
        &self,
        rule_name: Option<&str>,
        since_hours: i64,
    ) -> RecorderResult<Vec<ExecutionRecord>> {
        if since_hours < 0 {
            return Ok(Vec::new());
        }
        self.history_since(rule_name, window_start(Utc::now(), since_hours))
    }

    /// Records written at or after `since`, newest first
    ///
    /// Records sharing a timestamp are ordered by insertion, newest first.
    pub fn history_since(
        &self,
        rule_name: Option<&str>,
        since: DateTime<Utc>,
    ) -> RecorderResult<Vec<ExecutionRecord>> {
        let since = format_ts(since);

        let rows = self.db.with_conn(|conn| -> RecorderResult<Vec<RawRecord>> {
            let mut stmt = conn.prepare(
                "SELECT id, cycle_id, rule_name, triggered_by, context, result, error, actions, ts, duration_ms
                 FROM executions
                 WHERE ts >= ?1 AND (?2 IS NULL OR rule_name = ?2)
                 ORDER BY ts DESC, id DESC",
            )?;
            let rows = stmt
                .query_map(params![since, rule_name], RawRecord::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(RawRecord::hydrate).collect()
    }

    /// Records written by one fire cycle, in write order
    pub fn cycle(&self, cycle_id: &str) -> RecorderResult<Vec<ExecutionRecord>> {
        let rows = self.db.with_conn(|conn| -> RecorderResult<Vec<RawRecord>> {
            let mut stmt = conn.prepare(
                "SELECT id, cycle_id, rule_name, triggered_by, context, result, error, actions, ts, duration_ms
                 FROM executions
                 WHERE cycle_id = ?1
                 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![cycle_id], RawRecord::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(RawRecord::hydrate).collect()
    }

    /// Total number of records, optionally for one rule
    pub fn count(&self, rule_name: Option<&str>) -> RecorderResult<u64> {
        self.db.with_conn(|conn| -> RecorderResult<u64> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM executions WHERE (?1 IS NULL OR rule_name = ?1)",
                params![rule_name],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

/// Row as stored, before JSON and enum columns are decoded
struct RawRecord {
    id: i64,
    cycle_id: String,
    rule_name: String,
    triggered_by: String,
    context: String,
    result: String,
    error: Option<String>,
    actions: String,
    ts: String,
    duration_ms: f64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cycle_id: row.get(1)?,
            rule_name: row.get(2)?,
            triggered_by: row.get(3)?,
            context: row.get(4)?,
            result: row.get(5)?,
            error: row.get(6)?,
            actions: row.get(7)?,
            ts: row.get(8)?,
            duration_ms: row.get(9)?,
        })
    }

    fn hydrate(self) -> RecorderResult<ExecutionRecord> {
        let triggered_by =
            self.triggered_by
                .parse::<TriggerKind>()
                .map_err(|e| RecorderError::InvalidRow {
                    table: TABLE,
                    reason: e.to_string(),
                })?;

        Ok(ExecutionRecord {
            id: self.id,
            cycle_id: self.cycle_id,
            rule_name: self.rule_name,
            triggered_by,
            context: serde_json::from_str(&self.context)?,
            result: self.result.parse()?,
            error: self.error,
            actions: serde_json::from_str(&self.actions)?,
            timestamp: parse_ts(TABLE, &self.ts)?,
            duration_ms: self.duration_ms,
        })
    }
}

/// `now - hours`, clamped to the earliest representable time
fn window_start(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    Duration::try_hours(hours)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
