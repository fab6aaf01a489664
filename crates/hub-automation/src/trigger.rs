//! Trigger types
//!
//! A trigger names the event class that makes a rule eligible. In a rule
//! document it is written as `{"type": <kind>, "config": {...}}`.

use hub_core::TriggerKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::condition::ConditionOp;
use crate::rule::{RuleError, RuleResult};

/// Trigger definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TriggerDoc", into = "TriggerDoc")]
pub enum Trigger {
    /// Fires on a cron schedule or a fixed interval
    Time(TimeTrigger),

    /// Fires on a sensor reading
    Sensor(SensorTrigger),

    /// Fires on a named event
    Event(EventTrigger),

    /// Fires on an entity state transition
    State(StateTrigger),

    /// Fires on an inbound webhook
    Webhook(WebhookTrigger),
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Time(_) => TriggerKind::Time,
            Trigger::Sensor(_) => TriggerKind::Sensor,
            Trigger::Event(_) => TriggerKind::Event,
            Trigger::State(_) => TriggerKind::State,
            Trigger::Webhook(_) => TriggerKind::Webhook,
        }
    }

    /// Create an event trigger
    pub fn event(event_name: impl Into<String>) -> Self {
        Trigger::Event(EventTrigger {
            event_name: Some(event_name.into()),
        })
    }

    /// Create a sensor trigger with no threshold
    pub fn sensor(sensor_id: impl Into<String>) -> Self {
        Trigger::Sensor(SensorTrigger {
            sensor_id: sensor_id.into(),
            op: None,
            value: None,
        })
    }

    /// Check the kind-specific configuration
    pub fn validate(&self) -> RuleResult<()> {
        match self {
            Trigger::Time(t) => t.validate(),
            Trigger::Sensor(t) => t.validate(),
            Trigger::Event(_) => Ok(()),
            Trigger::State(t) => {
                if t.entity_id.trim().is_empty() {
                    return Err(invalid("state trigger requires entity_id"));
                }
                Ok(())
            }
            Trigger::Webhook(t) => {
                if !t.endpoint.starts_with('/') {
                    return Err(invalid(format!(
                        "webhook endpoint must start with '/': {:?}",
                        t.endpoint
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Time trigger - cron expression or interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
}

impl TimeTrigger {
    fn validate(&self) -> RuleResult<()> {
        match (&self.cron, self.interval_seconds) {
            (Some(cron), None) => {
                if is_cron(cron) {
                    Ok(())
                } else {
                    Err(invalid(format!("invalid cron expression: {cron:?}")))
                }
            }
            (None, Some(0)) => Err(invalid("interval_seconds must be greater than 0")),
            (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(invalid(
                "time trigger takes either cron or interval_seconds, not both",
            )),
            (None, None) => Err(invalid("time trigger requires cron or interval_seconds")),
        }
    }
}

/// Sensor trigger - sensor id with an optional threshold
///
/// The threshold is a routing pre-filter applied to the incoming reading,
/// separate from the rule's conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTrigger {
    pub sensor_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<ConditionOp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl SensorTrigger {
    /// Context path of this sensor's reading
    pub fn reading_path(&self) -> String {
        format!("{}.{}.value", hub_core::keys::SENSOR, self.sensor_id)
    }

    fn validate(&self) -> RuleResult<()> {
        if self.sensor_id.trim().is_empty() {
            return Err(invalid("sensor trigger requires sensor_id"));
        }

        match (&self.op, &self.value) {
            (None, None) => Ok(()),
            (Some(op), Some(value)) => {
                if !op.is_comparison() {
                    return Err(invalid(format!(
                        "sensor trigger op must be a comparison, got {op}"
                    )));
                }
                if !value.is_number() {
                    return Err(invalid(format!(
                        "sensor trigger threshold for {op} must be a number"
                    )));
                }
                Ok(())
            }
            _ => Err(invalid("sensor trigger op and value must be given together")),
        }
    }
}

/// Event trigger - optional event name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

/// State trigger - entity and expected new state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTrigger {
    pub entity_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
}

/// Webhook trigger - endpoint path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTrigger {
    pub endpoint: String,
}

/// Wire shape of a trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TriggerDoc {
    #[serde(rename = "type")]
    kind: TriggerKind,

    #[serde(default)]
    config: Map<String, Value>,
}

impl TryFrom<TriggerDoc> for Trigger {
    type Error = String;

    fn try_from(doc: TriggerDoc) -> Result<Self, Self::Error> {
        let config = Value::Object(doc.config);
        let parsed = match doc.kind {
            TriggerKind::Time => serde_json::from_value(config).map(Trigger::Time),
            TriggerKind::Sensor => serde_json::from_value(config).map(Trigger::Sensor),
            TriggerKind::Event => serde_json::from_value(config).map(Trigger::Event),
            TriggerKind::State => serde_json::from_value(config).map(Trigger::State),
            TriggerKind::Webhook => serde_json::from_value(config).map(Trigger::Webhook),
        };
        parsed.map_err(|e| format!("invalid {} trigger config: {e}", doc.kind))
    }
}

impl From<Trigger> for TriggerDoc {
    fn from(trigger: Trigger) -> Self {
        let kind = trigger.kind();
        let config = match trigger {
            Trigger::Time(t) => serde_json::to_value(t),
            Trigger::Sensor(t) => serde_json::to_value(t),
            Trigger::Event(t) => serde_json::to_value(t),
            Trigger::State(t) => serde_json::to_value(t),
            Trigger::Webhook(t) => serde_json::to_value(t),
        };

        let config = match config {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        TriggerDoc { kind, config }
    }
}

fn invalid(reason: impl Into<String>) -> RuleError {
    RuleError::Validation(reason.into())
}

/// 5 or 6 whitespace-separated fields of digits, `*`, `/`, `,` and `-`
fn is_cron(expr: &str) -> bool {
    static FIELD: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(field) = FIELD.get_or_init(|| Regex::new(r"^[0-9*/,\-]+$").ok()) else {
        return false;
    };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    matches!(fields.len(), 5 | 6) && fields.iter().all(|f| field.is_match(f))
}
