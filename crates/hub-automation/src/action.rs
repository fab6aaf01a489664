//! Action definitions
//!
//! Actions are stateless descriptions; hub-script executes them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::rule::{RuleError, RuleResult};

/// Notification channel used when `send_notify` names none
pub const DEFAULT_CHANNEL: &str = "default";

/// The closed set of action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LogMessage,
    SendNotify,
    SetState,
    CallService,
    RunScene,
    Delay,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::LogMessage => "log_message",
            ActionKind::SendNotify => "send_notify",
            ActionKind::SetState => "set_state",
            ActionKind::CallService => "call_service",
            ActionKind::RunScene => "run_scene",
            ActionKind::Delay => "delay",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a rule's action list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,

    /// Entity id (`set_state`) or service name (`call_service`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            params: Map::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// `log_message` action
    pub fn log(message: impl Into<String>) -> Self {
        Self::new(ActionKind::LogMessage).with_param("message", Value::String(message.into()))
    }

    /// `send_notify` action on a channel
    pub fn notify(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ActionKind::SendNotify)
            .with_param("channel", Value::String(channel.into()))
            .with_param("message", Value::String(message.into()))
    }

    /// `call_service` action
    pub fn call_service(service: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            kind: ActionKind::CallService,
            target: Some(service.into()),
            params,
        }
    }

    /// String parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Channel of a `send_notify` action
    pub fn channel(&self) -> &str {
        self.param_str("channel").unwrap_or(DEFAULT_CHANNEL)
    }

    /// Seconds of a `delay` action
    pub fn delay_seconds(&self) -> Option<f64> {
        self.params.get("seconds").and_then(Value::as_f64)
    }

    /// Check that the keys this kind needs are present
    pub fn validate(&self) -> RuleResult<()> {
        match self.kind {
            ActionKind::LogMessage | ActionKind::SendNotify => {
                self.require_param_str("message")?;
            }
            ActionKind::SetState => {
                self.require_target()?;
                match self.params.get("state") {
                    Some(Value::Null) | None => {
                        return Err(self.invalid("params.state is required"));
                    }
                    Some(_) => {}
                }
            }
            ActionKind::CallService => {
                self.require_target()?;
            }
            ActionKind::RunScene => {
                self.require_param_str("scene_name")?;
            }
            ActionKind::Delay => match self.delay_seconds() {
                Some(seconds) if seconds >= 0.0 && seconds.is_finite() => {}
                Some(_) => return Err(self.invalid("params.seconds must not be negative")),
                None => return Err(self.invalid("params.seconds must be a number")),
            },
        }

        if let Some(channel) = self.params.get("channel") {
            if self.kind == ActionKind::SendNotify && !channel.is_string() {
                return Err(self.invalid("params.channel must be a string"));
            }
        }

        Ok(())
    }

    fn require_target(&self) -> RuleResult<()> {
        match self.target.as_deref() {
            Some(target) if !target.trim().is_empty() => Ok(()),
            _ => Err(self.invalid("target is required")),
        }
    }

    fn require_param_str(&self, key: &str) -> RuleResult<()> {
        match self.params.get(key) {
            Some(Value::String(_)) => Ok(()),
            Some(_) => Err(self.invalid(format!("params.{key} must be a string"))),
            None => Err(self.invalid(format!("params.{key} is required"))),
        }
    }

    fn invalid(&self, reason: impl fmt::Display) -> RuleError {
        RuleError::Validation(format!("{} action: {reason}", self.kind))
    }
}
