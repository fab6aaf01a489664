//! Durable rule store
//!
//! Rules are keyed by name in the `rules` table. The rule document is kept
//! as JSON in `definition`; `enabled` and `priority` live in their own
//! columns so routing can filter and order in SQL, and they take
//! precedence over the copy inside the document.

use chrono::{DateTime, Utc};
use hub_core::TriggerKind;
use hub_recorder::{format_ts, parse_ts, Database, LogBook, LogLevel};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::rule::{Rule, RuleConfig, RuleError, RuleResult, RuleSummary};

const TABLE: &str = "rules";

const RULE_COLUMNS: &str = "seq, name, definition, enabled, priority, created_at, updated_at, \
                            last_triggered, trigger_count";

/// Keyed persistence of rule definitions and their trigger metadata
#[derive(Debug, Clone)]
pub struct RuleStore {
    db: Database,
    logbook: LogBook,
}

impl RuleStore {
    pub fn new(db: Database) -> Self {
        Self {
            logbook: LogBook::new(db.clone()),
            db,
        }
    }

    /// Insert or fully replace a rule by name
    ///
    /// Replacing keeps the creation order, `created_at` and the trigger
    /// counters of the existing rule. Invalid rules are not persisted.
    #[instrument(skip(self, config), fields(rule = %config.name))]
    pub fn upsert(&self, config: RuleConfig) -> RuleResult<Rule> {
        config.validate()?;

        let definition = serde_json::to_string(&config)
            .map_err(|e| RuleError::Validation(e.to_string()))?;
        let now = format_ts(Utc::now());

        let rule = self.db.with_conn(|conn| -> RuleResult<Rule> {
            conn.execute(
                "INSERT INTO rules
                    (name, definition, trigger_type, enabled, priority, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(name) DO UPDATE SET
                    definition = excluded.definition,
                    trigger_type = excluded.trigger_type,
                    enabled = excluded.enabled,
                    priority = excluded.priority,
                    updated_at = excluded.updated_at",
                params![
                    config.name,
                    definition,
                    config.trigger_kind().as_str(),
                    config.enabled,
                    config.priority,
                    now,
                ],
            )?;

            select_one(conn, &config.name)?.ok_or_else(|| RuleError::NotFound(config.name.clone()))
        })?;

        self.logbook
            .append(LogLevel::Info, &format!("Rule added: {}", rule.name), &json!({}))?;
        info!(trigger = %rule.trigger_kind(), priority = rule.priority, "Rule stored");
        Ok(rule)
    }

    /// Parse, validate and upsert a JSON rule document
    pub fn import_json(&self, json: &str) -> RuleResult<Rule> {
        self.upsert(RuleConfig::from_json(json)?)
    }

    /// Serialize a stored rule back to its JSON document
    pub fn export_json(&self, name: &str) -> RuleResult<String> {
        let rule = self
            .get(name)?
            .ok_or_else(|| RuleError::NotFound(name.to_string()))?;

        serde_json::to_string_pretty(&rule.to_config())
            .map_err(|e| RuleError::Storage(e.into()))
    }

    pub fn get(&self, name: &str) -> RuleResult<Option<Rule>> {
        self.db
            .with_conn(|conn| -> RuleResult<Option<Rule>> { select_one(conn, name) })
    }

    /// All rules, highest priority first
    pub fn list(&self) -> RuleResult<Vec<Rule>> {
        self.db.with_conn(|conn| -> RuleResult<Vec<Rule>> {
            select_many(
                conn,
                &format!("SELECT {RULE_COLUMNS} FROM rules ORDER BY priority DESC, seq ASC"),
                params![],
            )
        })
    }

    pub fn list_summaries(&self) -> RuleResult<Vec<RuleSummary>> {
        Ok(self.list()?.iter().map(Rule::summary).collect())
    }

    /// Enabled rules of one trigger kind, by priority then creation order
    pub fn active_rules_for_trigger(&self, kind: TriggerKind) -> RuleResult<Vec<Rule>> {
        self.db.with_conn(|conn| -> RuleResult<Vec<Rule>> {
            select_many(
                conn,
                &format!(
                    "SELECT {RULE_COLUMNS} FROM rules
                     WHERE trigger_type = ?1 AND enabled = 1
                     ORDER BY priority DESC, seq ASC"
                ),
                params![kind.as_str()],
            )
        })
    }

    pub fn enable(&self, name: &str) -> RuleResult<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> RuleResult<()> {
        self.set_enabled(name, false)
    }

    #[instrument(skip(self))]
    fn set_enabled(&self, name: &str, enabled: bool) -> RuleResult<()> {
        let changed = self.db.with_conn(|conn| -> RuleResult<usize> {
            Ok(conn.execute(
                "UPDATE rules SET enabled = ?1, updated_at = ?2 WHERE name = ?3",
                params![enabled, format_ts(Utc::now()), name],
            )?)
        })?;

        if changed == 0 {
            return Err(RuleError::NotFound(name.to_string()));
        }

        debug!(enabled, "Rule toggled");
        Ok(())
    }

    /// Remove a rule permanently
    #[instrument(skip(self))]
    pub fn delete(&self, name: &str) -> RuleResult<()> {
        let changed = self.db.with_conn(|conn| -> RuleResult<usize> {
            Ok(conn.execute("DELETE FROM rules WHERE name = ?1", params![name])?)
        })?;

        if changed == 0 {
            return Err(RuleError::NotFound(name.to_string()));
        }

        self.logbook
            .append(LogLevel::Info, &format!("Rule deleted: {name}"), &json!({}))?;
        info!("Rule deleted");
        Ok(())
    }

    /// Bump `trigger_count` and set `last_triggered`
    ///
    /// Only the engine calls this, once per rule whose guard passed.
    pub fn record_fire(&self, name: &str, at: DateTime<Utc>) -> RuleResult<()> {
        let changed = self.db.with_conn(|conn| -> RuleResult<usize> {
            Ok(conn.execute(
                "UPDATE rules
                 SET trigger_count = trigger_count + 1, last_triggered = ?1
                 WHERE name = ?2",
                params![format_ts(at), name],
            )?)
        })?;

        if changed == 0 {
            return Err(RuleError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn count(&self) -> RuleResult<usize> {
        self.db.with_conn(|conn| -> RuleResult<usize> {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM rules", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

/// Columns of one `rules` row, before decoding
struct RuleRow {
    seq: i64,
    name: String,
    definition: String,
    enabled: bool,
    priority: i64,
    created_at: String,
    updated_at: String,
    last_triggered: Option<String>,
    trigger_count: i64,
}

impl RuleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            name: row.get(1)?,
            definition: row.get(2)?,
            enabled: row.get(3)?,
            priority: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            last_triggered: row.get(7)?,
            trigger_count: row.get(8)?,
        })
    }

    fn into_rule(self) -> RuleResult<Rule> {
        let config: RuleConfig = serde_json::from_str(&self.definition).map_err(|e| {
            hub_recorder::RecorderError::InvalidRow {
                table: TABLE,
                reason: format!("rule {}: {e}", self.name),
            }
        })?;

        let last_triggered = self
            .last_triggered
            .as_deref()
            .map(|raw| parse_ts(TABLE, raw))
            .transpose()?;

        Ok(Rule {
            name: self.name,
            description: config.description,
            priority: self.priority,
            enabled: self.enabled,
            trigger: config.trigger,
            conditions: config.conditions,
            actions: config.actions,
            seq: self.seq,
            created_at: parse_ts(TABLE, &self.created_at)?,
            updated_at: parse_ts(TABLE, &self.updated_at)?,
            last_triggered,
            trigger_count: self.trigger_count.max(0) as u64,
        })
    }
}

fn select_one(conn: &Connection, name: &str) -> RuleResult<Option<Rule>> {
    conn.query_row(
        &format!("SELECT {RULE_COLUMNS} FROM rules WHERE name = ?1"),
        params![name],
        RuleRow::from_row,
    )
    .optional()?
    .map(RuleRow::into_rule)
    .transpose()
}

fn select_many(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> RuleResult<Vec<Rule>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, RuleRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(RuleRow::into_rule).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::condition::{Condition, ConditionOp};
    use crate::trigger::Trigger;

    fn store() -> RuleStore {
        RuleStore::new(Database::open_in_memory().unwrap())
    }

    fn motion(priority: i64) -> RuleConfig {
        RuleConfig::new("motion_lights", Trigger::event("motion_detected"))
            .with_priority(priority)
            .with_condition(Condition::new(
                "event.name",
                ConditionOp::Eq,
                json!("motion_detected"),
            ))
            .with_action(Action::log("motion seen"))
    }

    #[test]
    fn test_upsert_and_get() {
        let store = store();
        let rule = store.upsert(motion(5)).unwrap();

        assert_eq!(rule.trigger_count, 0);
        assert!(rule.last_triggered.is_none());
        assert_eq!(store.get("motion_lights").unwrap(), Some(rule));
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_replace_keeps_metadata() {
        let store = store();
        let first = store.upsert(motion(5)).unwrap();
        store.record_fire("motion_lights", Utc::now()).unwrap();

        let replaced = store.upsert(motion(9)).unwrap();

        assert_eq!(replaced.priority, 9);
        assert_eq!(replaced.seq, first.seq);
        assert_eq!(replaced.created_at, first.created_at);
        assert_eq!(replaced.trigger_count, 1);
        assert!(replaced.last_triggered.is_some());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_invalid_rule_not_persisted() {
        let store = store();
        let bad = RuleConfig::new("bad", Trigger::event("x"))
            .with_action(Action::new(crate::action::ActionKind::CallService));

        assert!(matches!(store.upsert(bad), Err(RuleError::Validation(_))));
        assert!(store.get("bad").unwrap().is_none());
    }

    #[test]
    fn test_active_rules_ordering() {
        let store = store();
        store
            .upsert(RuleConfig::new("low", Trigger::event("e")).with_priority(1))
            .unwrap();
        store
            .upsert(RuleConfig::new("tie_a", Trigger::event("e")).with_priority(5))
            .unwrap();
        store
            .upsert(RuleConfig::new("tie_b", Trigger::event("e")).with_priority(5))
            .unwrap();
        store
            .upsert(RuleConfig::new("sensor", Trigger::sensor("t1")).with_priority(99))
            .unwrap();

        let names: Vec<_> = store
            .active_rules_for_trigger(TriggerKind::Event)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["tie_a", "tie_b", "low"]);
    }

    #[test]
    fn test_enable_disable() {
        let store = store();
        store.upsert(motion(5)).unwrap();

        store.disable("motion_lights").unwrap();
        assert!(store
            .active_rules_for_trigger(TriggerKind::Event)
            .unwrap()
            .is_empty());
        let disabled = store.get("motion_lights").unwrap().unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.priority, 5);

        store.enable("motion_lights").unwrap();
        assert_eq!(
            store.active_rules_for_trigger(TriggerKind::Event).unwrap().len(),
            1
        );

        assert!(matches!(store.enable("ghost"), Err(RuleError::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let store = store();
        store.upsert(motion(5)).unwrap();

        store.delete("motion_lights").unwrap();
        assert!(store.get("motion_lights").unwrap().is_none());
        assert!(matches!(
            store.delete("motion_lights"),
            Err(RuleError::NotFound(_))
        ));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let store = store();
        let original = store.upsert(motion(5)).unwrap();

        let json = store.export_json("motion_lights").unwrap();
        store.delete("motion_lights").unwrap();
        let reimported = store.import_json(&json).unwrap();

        assert_eq!(reimported.to_config(), original.to_config());
    }

    #[test]
    fn test_summaries_and_log_rows() {
        let db = Database::open_in_memory().unwrap();
        let store = RuleStore::new(db.clone());
        store.upsert(motion(5)).unwrap();
        store.record_fire("motion_lights", Utc::now()).unwrap();

        let summaries = store.list_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].trigger_count, 1);

        let logs = LogBook::new(db).recent(10).unwrap();
        assert_eq!(logs[0].message, "Rule added: motion_lights");
    }

    #[test]
    fn test_rules_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rules.db");

        {
            let store = RuleStore::new(Database::open_at(&path).unwrap());
            store.upsert(motion(5)).unwrap();
        }

        let store = RuleStore::new(Database::open_at(&path).unwrap());
        assert!(store.get("motion_lights").unwrap().is_some());
    }
}
