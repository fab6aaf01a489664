//! Action executor
//!
//! Runs one action, or a rule's whole action list, against the hub's
//! collaborators. Failures are returned as values in [`ActionOutcome`];
//! nothing here aborts the caller's fire cycle.

use hub_automation::{Action, ActionKind};
use hub_core::{Context, DEFAULT_REDACT_KEYS};
use hub_recorder::{LogBook, LogLevel};
use hub_service_registry::{ServiceError, ServiceRegistry};
use hub_state_store::{SceneError, SceneRegistry, StateStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::notify::{Notification, NotifierRegistry, NotifyError};

/// Upper bound on a single `delay` unless configured otherwise
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Action failures
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service {service} failed: {reason}")]
    Failed { service: String, reason: String },

    #[error("invalid params for service {service}: {reason}")]
    InvalidParams { service: String, reason: String },

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("delay of {requested}s exceeds the {max}s limit")]
    DelayTooLong { requested: f64, max: f64 },

    #[error("malformed {kind} action: {reason}")]
    Malformed { kind: ActionKind, reason: String },
}

impl ActionError {
    fn from_service(service: &str, err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(name) => ActionError::ServiceNotFound(name),
            ServiceError::InvalidData(reason) => ActionError::InvalidParams {
                service: service.to_string(),
                reason,
            },
            other => ActionError::Failed {
                service: service.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result of one executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(rename = "type")]
    pub kind: ActionKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub ok: bool,

    /// What the action produced, on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: f64,
}

/// Result of running a rule's action list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceOutcome {
    /// One entry per attempted action, in order
    pub outcomes: Vec<ActionOutcome>,

    /// Error of the action that stopped the sequence
    pub error: Option<String>,
}

impl SequenceOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Action executor
///
/// Executes actions with access to the hub's services, entity states,
/// scenes, notification sinks and message log.
pub struct ActionExecutor {
    services: Arc<ServiceRegistry>,
    states: Arc<StateStore>,
    scenes: Arc<SceneRegistry>,
    notifiers: Arc<NotifierRegistry>,
    logbook: LogBook,
    max_delay: Duration,
    redact_keys: Vec<String>,
}

impl ActionExecutor {
    pub fn new(
        services: Arc<ServiceRegistry>,
        states: Arc<StateStore>,
        scenes: Arc<SceneRegistry>,
        notifiers: Arc<NotifierRegistry>,
        logbook: LogBook,
    ) -> Self {
        Self {
            services,
            states,
            scenes,
            notifiers,
            logbook,
            max_delay: DEFAULT_MAX_DELAY,
            redact_keys: DEFAULT_REDACT_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Longest `delay` allowed; longer delays fail the action
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Keys removed from contexts before they leave the cycle
    pub fn with_redact_keys(mut self, redact_keys: Vec<String>) -> Self {
        self.redact_keys = redact_keys;
        self
    }

    pub fn redact_keys(&self) -> &[String] {
        &self.redact_keys
    }

    /// Execute a sequence of actions in order
    ///
    /// The first failure stops the sequence; later actions are not attempted.
    pub async fn execute_all(&self, actions: &[Action], ctx: &Context) -> SequenceOutcome {
        debug!("Executing {} actions", actions.len());
        let mut sequence = SequenceOutcome::default();

        for (i, action) in actions.iter().enumerate() {
            trace!("Executing action {}: {}", i, action.kind);

            let outcome = self.execute(action, ctx).await;
            let failed = outcome.error.clone();
            sequence.outcomes.push(outcome);

            if let Some(error) = failed {
                let skipped = actions.len() - i - 1;
                warn!(action = %action.kind, skipped, error = %error, "Action failed, stopping sequence");
                sequence.error = Some(error);
                break;
            }
        }

        sequence
    }

    /// Execute a single action
    pub async fn execute(&self, action: &Action, ctx: &Context) -> ActionOutcome {
        let started = Instant::now();
        let result = self.run(action, ctx).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (output, error) = match result {
            Ok(output) => (Some(output), None),
            Err(e) => (None, Some(e.to_string())),
        };

        ActionOutcome {
            kind: action.kind,
            target: action.target.clone(),
            ok: error.is_none(),
            output,
            error,
            duration_ms,
        }
    }

    async fn run(&self, action: &Action, ctx: &Context) -> Result<Value, ActionError> {
        match action.kind {
            ActionKind::LogMessage => self.log_message(action, ctx),
            ActionKind::SendNotify => self.send_notify(action, ctx).await,
            ActionKind::SetState => self.set_state(action),
            ActionKind::CallService => self.call_service(action, ctx).await,
            ActionKind::RunScene => self.run_scene(action),
            ActionKind::Delay => self.delay(action).await,
        }
    }

    fn log_message(&self, action: &Action, ctx: &Context) -> Result<Value, ActionError> {
        let message = action.param_str("message").unwrap_or_default();
        info!(message = %message, "[rule_action]");

        // The log row is best effort; the action itself always succeeds
        let snapshot = ctx.sanitized(&self.redact_keys);
        if let Err(e) =
            self.logbook
                .append(LogLevel::Info, &format!("[rule_action] {message}"), &snapshot)
        {
            warn!(error = %e, "Could not write log_message row");
        }

        Ok(json!({ "logged": message }))
    }

    async fn send_notify(&self, action: &Action, ctx: &Context) -> Result<Value, ActionError> {
        let message = required_str(action, "message")?;
        let notification = Notification {
            channel: action.channel().to_string(),
            message: message.to_string(),
            context: ctx.sanitized(&self.redact_keys),
        };

        self.notifiers.send(&notification).await?;
        Ok(json!({
            "channel": notification.channel,
            "message": notification.message,
        }))
    }

    fn set_state(&self, action: &Action) -> Result<Value, ActionError> {
        let entity_id = required_target(action)?;
        let state = match action.params.get("state") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Err(malformed(action, "params.state is required"));
            }
            Some(other) => other.to_string(),
        };

        let attributes: HashMap<String, Value> = action
            .params
            .get("attributes")
            .and_then(Value::as_object)
            .map(|attrs| attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let new_state = self.states.set(entity_id, state, attributes);
        debug!(entity_id = %entity_id, state = %new_state.state, "State set by action");

        Ok(json!({ "entity_id": entity_id, "state": new_state.state }))
    }

    async fn call_service(&self, action: &Action, ctx: &Context) -> Result<Value, ActionError> {
        let service = required_target(action)?;

        debug!("Calling service: {}", service);
        self.services
            .call(service, Value::Object(action.params.clone()), ctx.clone())
            .await
            .map_err(|e| ActionError::from_service(service, e))
    }

    fn run_scene(&self, action: &Action) -> Result<Value, ActionError> {
        let scene = required_str(action, "scene_name")?;
        let applied = self.scenes.activate(scene, &self.states)?;

        Ok(json!({ "scene": scene, "entities": applied.len() }))
    }

    async fn delay(&self, action: &Action) -> Result<Value, ActionError> {
        let seconds = action
            .delay_seconds()
            .filter(|s| *s >= 0.0 && s.is_finite())
            .ok_or_else(|| malformed(action, "params.seconds must be a non-negative number"))?;

        let max = self.max_delay.as_secs_f64();
        if seconds > max {
            return Err(ActionError::DelayTooLong {
                requested: seconds,
                max,
            });
        }

        let duration = Duration::from_secs_f64(seconds);
        debug!("Delaying for {:?}", duration);
        tokio::time::sleep(duration).await;

        Ok(json!({ "delayed": seconds }))
    }
}

fn malformed(action: &Action, reason: &str) -> ActionError {
    ActionError::Malformed {
        kind: action.kind,
        reason: reason.to_string(),
    }
}

fn required_str<'a>(action: &'a Action, key: &str) -> Result<&'a str, ActionError> {
    action
        .param_str(key)
        .ok_or_else(|| malformed(action, &format!("params.{key} is required")))
}

fn required_target(action: &Action) -> Result<&str, ActionError> {
    action
        .target
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| malformed(action, "target is required"))
}
