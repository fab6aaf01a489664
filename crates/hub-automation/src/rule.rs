//! Rule documents and stored rules
//!
//! A [`RuleConfig`] is the JSON document a caller imports. The store keeps
//! it as a [`Rule`], which adds the metadata only the store and the engine
//! write: creation order, timestamps and trigger counters.

use chrono::{DateTime, Utc};
use hub_core::TriggerKind;
use hub_recorder::RecorderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::Action;
use crate::condition::Condition;
use crate::trigger::Trigger;

/// Rule errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid rule: {0}")]
    Validation(String),

    #[error("rule not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] RecorderError),
}

impl From<rusqlite::Error> for RuleError {
    fn from(e: rusqlite::Error) -> Self {
        RuleError::Storage(RecorderError::Database(e))
    }
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Rule document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Higher runs earlier within one trigger cycle
    #[serde(default)]
    pub priority: i64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub trigger: Trigger,

    /// Guard conditions (AND); empty always passes
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Executed in listed order
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_enabled() -> bool {
    true
}

impl RuleConfig {
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            priority: 0,
            enabled: true,
            trigger,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parse a JSON rule document and validate it
    pub fn from_json(json: &str) -> RuleResult<Self> {
        let config: RuleConfig =
            serde_json::from_str(json).map_err(|e| RuleError::Validation(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Same as [`RuleConfig::from_json`] for an already-parsed document
    pub fn from_value(value: serde_json::Value) -> RuleResult<Self> {
        let config: RuleConfig =
            serde_json::from_value(value).map_err(|e| RuleError::Validation(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every part of the rule
    pub fn validate(&self) -> RuleResult<()> {
        if self.name.trim().is_empty() {
            return Err(RuleError::Validation(
                "rule name must not be empty".to_string(),
            ));
        }

        self.trigger.validate()?;
        for condition in &self.conditions {
            condition.validate()?;
        }
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        self.trigger.kind()
    }
}

/// A stored rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub priority: i64,
    pub enabled: bool,
    pub trigger: Trigger,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,

    /// Creation order; the tie-break between equal priorities
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub trigger_count: u64,
}

impl Rule {
    /// Recover the document this rule was stored from
    pub fn to_config(&self) -> RuleConfig {
        RuleConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            priority: self.priority,
            enabled: self.enabled,
            trigger: self.trigger.clone(),
            conditions: self.conditions.clone(),
            actions: self.actions.clone(),
        }
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        self.trigger.kind()
    }

    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            name: self.name.clone(),
            enabled: self.enabled,
            priority: self.priority,
            trigger_count: self.trigger_count,
            last_triggered: self.last_triggered,
        }
    }
}

/// Listing entry for a stored rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub name: String,
    pub enabled: bool,
    pub priority: i64,
    pub trigger_count: u64,
    pub last_triggered: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::condition::ConditionOp;
    use serde_json::json;

    fn high_temp() -> serde_json::Value {
        json!({
            "name": "high_temp_alert",
            "description": "Alert when temperature exceeds 30°C",
            "priority": 10,
            "trigger": {"type": "sensor", "config": {"sensor_id": "t1"}},
            "conditions": [{"field": "sensor.t1.value", "op": ">", "value": 30}],
            "actions": [{
                "type": "send_notify",
                "params": {"channel": "ops", "message": "too hot"}
            }]
        })
    }

    #[test]
    fn test_parse_rule_document() {
        let config = RuleConfig::from_json(&high_temp().to_string()).unwrap();

        assert_eq!(config.name, "high_temp_alert");
        assert_eq!(config.priority, 10);
        assert!(config.enabled);
        assert_eq!(config.trigger_kind(), TriggerKind::Sensor);
        assert_eq!(config.conditions[0].op, ConditionOp::Gt);
        assert_eq!(config.actions[0].kind, ActionKind::SendNotify);
    }

    #[test]
    fn test_defaults() {
        let config = RuleConfig::from_json(
            &json!({"name": "bare", "trigger": {"type": "event"}}).to_string(),
        )
        .unwrap();

        assert_eq!(config.priority, 0);
        assert!(config.enabled);
        assert!(config.conditions.is_empty());
        assert!(config.actions.is_empty());
    }

    #[test]
    fn test_invalid_documents() {
        let mut doc = high_temp();
        doc["actions"][0]["type"] = json!("teleport");
        assert!(matches!(
            RuleConfig::from_json(&doc.to_string()),
            Err(RuleError::Validation(_))
        ));

        let mut doc = high_temp();
        doc["name"] = json!("");
        assert!(matches!(
            RuleConfig::from_json(&doc.to_string()),
            Err(RuleError::Validation(_))
        ));

        assert!(RuleConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_document_roundtrip() {
        let config = RuleConfig::from_json(&high_temp().to_string()).unwrap();
        let json = serde_json::to_string(&config).unwrap();

        assert_eq!(RuleConfig::from_json(&json).unwrap(), config);
    }
}
