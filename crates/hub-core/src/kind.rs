//! Trigger kind tag

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The event class that makes a rule eligible for evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Cron expression or fixed interval
    Time,
    /// Sensor reading crossing a threshold
    Sensor,
    /// Named system event
    Event,
    /// Entity state transition
    State,
    /// Inbound HTTP call
    Webhook,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 5] = [
        TriggerKind::Time,
        TriggerKind::Sensor,
        TriggerKind::Event,
        TriggerKind::State,
        TriggerKind::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Time => "time",
            TriggerKind::Sensor => "sensor",
            TriggerKind::Event => "event",
            TriggerKind::State => "state",
            TriggerKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown trigger kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trigger type: {0:?}")]
pub struct UnknownTriggerKind(pub String);

impl FromStr for TriggerKind {
    type Err = UnknownTriggerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownTriggerKind(s.to_string()))
    }
}
