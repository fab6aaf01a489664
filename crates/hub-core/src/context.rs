//! Per-cycle context data bag
//!
//! A [`Context`] is assembled by the caller for one fire cycle and read by
//! conditions and actions through dotted field paths such as
//! `sensor.t1.value`. It is never persisted verbatim: the ledger stores the
//! [`Context::sanitized`] snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keys;

/// Keys stripped from persisted context snapshots unless configured otherwise
pub const DEFAULT_REDACT_KEYS: &[&str] = &[
    "credentials",
    "password",
    "secret",
    "token",
    "api_key",
    "authorization",
];

/// Mapping from field names to scalar or collection values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON value; only objects are accepted
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Context for a named event: `{event: {name, data}, ts}`
    pub fn for_event(name: impl Into<String>, data: Value) -> Self {
        let mut event = Map::new();
        event.insert("name".to_string(), Value::String(name.into()));
        event.insert("data".to_string(), object_or_empty(data));
        Self::new().with(keys::EVENT, Value::Object(event)).stamped()
    }

    /// Context for a sensor reading: `{sensor: {<id>: {value, unit}}, ts}`
    pub fn for_sensor(sensor_id: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        let mut reading = Map::new();
        reading.insert("value".to_string(), Value::from(value));
        reading.insert("unit".to_string(), Value::String(unit.into()));

        let mut sensors = Map::new();
        sensors.insert(sensor_id.into(), Value::Object(reading));
        Self::new().with(keys::SENSOR, Value::Object(sensors)).stamped()
    }

    /// Context for an entity state transition
    pub fn for_state_change(
        entity_id: impl Into<String>,
        new_state: impl Into<String>,
        old_state: Option<String>,
    ) -> Self {
        let mut state = Map::new();
        state.insert("entity_id".to_string(), Value::String(entity_id.into()));
        state.insert("new_state".to_string(), Value::String(new_state.into()));
        state.insert(
            "old_state".to_string(),
            old_state.map(Value::String).unwrap_or(Value::Null),
        );
        Self::new().with(keys::STATE, Value::Object(state)).stamped()
    }

    /// Context for an inbound (already authenticated) webhook
    pub fn for_webhook(endpoint: impl Into<String>, data: Value) -> Self {
        let mut webhook = Map::new();
        webhook.insert("endpoint".to_string(), Value::String(endpoint.into()));
        webhook.insert("data".to_string(), data);
        Self::new().with(keys::WEBHOOK, Value::Object(webhook)).stamped()
    }

    /// Context for a timer tick
    pub fn for_timer(now: DateTime<Utc>) -> Self {
        let mut time = Map::new();
        time.insert("now".to_string(), Value::String(format_ts(now)));
        Self::new().with(keys::TIME, Value::Object(time)).stamped()
    }

    /// Add a top-level key
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Insert a top-level key
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Get a top-level key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolve a dot-separated path into nested mappings.
    ///
    /// Returns `None` when any segment is missing, when an intermediate
    /// value is not a mapping, or when the final value is `null`.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;

        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }

        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    /// Snapshot of the context with every redacted key removed at any depth
    ///
    /// Key matching is case-insensitive.
    pub fn sanitized<S: AsRef<str>>(&self, redact_keys: &[S]) -> Value {
        redact(&Value::Object(self.0.clone()), redact_keys)
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON object value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn stamped(self) -> Self {
        self.with(keys::TS, Value::String(format_ts(Utc::now())))
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn object_or_empty(value: Value) -> Value {
    match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn redact<S: AsRef<str>>(value: &Value, redact_keys: &[S]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| {
                    !redact_keys
                        .iter()
                        .any(|r| r.as_ref().eq_ignore_ascii_case(k))
                })
                .map(|(k, v)| (k.clone(), redact(v, redact_keys)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact(v, redact_keys)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_nested_path() {
        let ctx = Context::from_value(json!({"sensor": {"t1": {"value": 35.0}}})).unwrap();

        assert_eq!(ctx.resolve("sensor.t1.value"), Some(&json!(35.0)));
        assert_eq!(ctx.resolve("sensor.t1"), Some(&json!({"value": 35.0})));
    }

    #[test]
    fn test_resolve_missing_segments() {
        let ctx = Context::from_value(json!({"sensor": {"t1": {"value": 35.0}}})).unwrap();

        assert_eq!(ctx.resolve("sensor.t2.value"), None);
        assert_eq!(ctx.resolve("sensor.t1.value.deeper"), None);
        assert_eq!(ctx.resolve("missing"), None);
        assert_eq!(ctx.resolve(""), None);
    }

    #[test]
    fn test_resolve_null_is_missing() {
        let ctx = Context::new().with("state", json!({"old_state": null}));
        assert_eq!(ctx.resolve("state.old_state"), None);
    }

    #[test]
    fn test_for_sensor_shape() {
        let ctx = Context::for_sensor("t1", 35.0, "°C");

        assert_eq!(ctx.resolve("sensor.t1.value"), Some(&json!(35.0)));
        assert_eq!(ctx.resolve("sensor.t1.unit"), Some(&json!("°C")));
        assert!(ctx.get(keys::TS).is_some());
    }

    #[test]
    fn test_for_event_null_data_becomes_empty_map() {
        let ctx = Context::for_event("motion_detected", Value::Null);

        assert_eq!(ctx.resolve("event.name"), Some(&json!("motion_detected")));
        assert_eq!(ctx.resolve("event.data"), Some(&json!({})));
    }

    #[test]
    fn test_sanitized_strips_nested_keys() {
        let ctx = Context::from_value(json!({
            "credentials": {"user": "a"},
            "webhook": {"data": {"Token": "abc", "status": "paid", "items": [{"password": "x", "id": 1}]}}
        }))
        .unwrap();

        let snapshot = ctx.sanitized(DEFAULT_REDACT_KEYS);

        assert_eq!(
            snapshot,
            json!({"webhook": {"data": {"status": "paid", "items": [{"id": 1}]}}})
        );
        // The live context is untouched
        assert!(ctx.get("credentials").is_some());
    }
}
