//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use hub_recorder::Database;
use hub_script::{Notification, NotificationSink, NotifierRegistry, NotifyError};
use hub_server::{Collaborators, RuleEngine};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Sink that keeps every notification it receives
#[derive(Default)]
pub struct CaptureSink {
    sent: Mutex<Vec<Notification>>,
}

impl CaptureSink {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for CaptureSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "capture"
    }
}

/// An engine wired to an in-memory database, with every notification
/// channel captured
pub struct TestHub {
    pub engine: Arc<RuleEngine>,
    pub notifications: Arc<CaptureSink>,
}

impl TestHub {
    pub fn new() -> Self {
        Self::custom(Database::open_in_memory().unwrap(), |engine| engine)
    }

    pub fn with_db(db: Database) -> Self {
        Self::custom(db, |engine| engine)
    }

    pub fn custom(db: Database, configure: impl FnOnce(RuleEngine) -> RuleEngine) -> Self {
        let notifications = Arc::new(CaptureSink::default());
        let collaborators = Collaborators {
            notifiers: Arc::new(NotifierRegistry::with_fallback(notifications.clone())),
            ..Collaborators::default()
        };

        Self {
            engine: Arc::new(configure(RuleEngine::new(db, collaborators))),
            notifications,
        }
    }

    /// Import a rule document
    pub async fn add(&self, document: Value) {
        self.engine
            .import_rule_json(&document.to_string())
            .await
            .unwrap();
    }

    pub fn trigger_count(&self, rule: &str) -> u64 {
        self.engine.get_rule(rule).unwrap().unwrap().trigger_count
    }

    pub fn history_len(&self, rule: &str) -> usize {
        self.engine.history(Some(rule), None).unwrap().len()
    }
}

pub fn high_temp_rule() -> Value {
    json!({
        "name": "high_temp_alert",
        "description": "Alert when temperature exceeds 30°C",
        "priority": 10,
        "trigger": {"type": "sensor", "config": {"sensor_id": "t1"}},
        "conditions": [{"field": "sensor.t1.value", "op": ">", "value": 30}],
        "actions": [{
            "type": "send_notify",
            "params": {"channel": "ops", "message": "Temperature too high"}
        }]
    })
}

pub fn billing_rule() -> Value {
    json!({
        "name": "premium_activation",
        "description": "Activate premium when an invoice is paid",
        "priority": 20,
        "trigger": {"type": "event", "config": {"event_name": "stripe.invoice.payment_succeeded"}},
        "conditions": [{"field": "event.data.status", "op": "==", "value": "paid"}],
        "actions": [
            {
                "type": "call_service",
                "target": "subscription_manager",
                "params": {"action": "activate_premium"}
            },
            {
                "type": "send_notify",
                "params": {"channel": "billing", "message": "Premium activated"}
            }
        ]
    })
}

/// A minimal event rule with the given priority and actions
pub fn event_rule(name: &str, event: &str, priority: i64, actions: Value) -> Value {
    json!({
        "name": name,
        "priority": priority,
        "trigger": {"type": "event", "config": {"event_name": event}},
        "actions": actions
    })
}
