//! Hub configuration (`hub.yaml`)

use hub_core::DEFAULT_REDACT_KEYS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Hub configuration
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    /// SQLite file path, or `:memory:`
    pub database: String,

    /// Default tracing level; `RUST_LOG` overrides it
    pub log_level: String,

    /// Window used by history queries that don't name one
    pub history_hours: i64,

    /// Longest permitted `delay` action
    pub max_delay_seconds: f64,

    /// Context keys removed before persisting or notifying
    pub redact_keys: Vec<String>,

    /// Rule documents imported (upsert) at startup
    pub rules: Vec<serde_json::Value>,

    /// Scene name → {entity_id: state}
    pub scenes: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            database: "automation_hub.db".to_string(),
            log_level: "info".to_string(),
            history_hours: 24,
            max_delay_seconds: 30.0,
            redact_keys: DEFAULT_REDACT_KEYS.iter().map(|k| k.to_string()).collect(),
            rules: Vec::new(),
            scenes: BTreeMap::new(),
        }
    }
}

impl HubConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let value = load_yaml(path)?;

        // An empty document parses as null
        let config: HubConfig = if value.is_null() {
            HubConfig::default()
        } else {
            serde_yaml::from_value(value).map_err(ConfigError::Shape)?
        };

        config.validate()?;
        info!(
            path = %path.display(),
            rules = config.rules.len(),
            scenes = config.scenes.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate YAML text without tag resolution
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: HubConfig = serde_yaml::from_str(content).map_err(ConfigError::Shape)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.trim().is_empty() {
            return Err(invalid("database", "must not be empty"));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(invalid(
                "log_level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        if self.history_hours <= 0 {
            return Err(invalid("history_hours", "must be greater than 0"));
        }
        if let Err(e) = Duration::try_from_secs_f64(self.max_delay_seconds) {
            return Err(invalid(
                "max_delay_seconds",
                format!("must be a non-negative number of seconds: {e}"),
            ));
        }
        for (name, entities) in &self.scenes {
            if entities.is_empty() {
                return Err(invalid(&format!("scenes.{name}"), "has no entities"));
            }
        }
        Ok(())
    }

    /// Delay bound; out-of-range values (rejected by `validate`) fall back
    /// to zero
    pub fn max_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay_seconds).unwrap_or(Duration::ZERO)
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HubConfig::from_yaml_str("{}").unwrap();

        assert_eq!(config, HubConfig::default());
        assert_eq!(config.max_delay(), Duration::from_secs(30));
        assert!(config.redact_keys.iter().any(|k| k == "credentials"));
    }

    #[test]
    fn test_full_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "db: hub-prod.db\n").unwrap();
        fs::write(
            dir.path().join("hub.yaml"),
            r#"
database: !secret db
log_level: debug
max_delay_seconds: 2.5
redact_keys: [credentials, card_number]
scenes:
  evening:
    light.hallway: "on"
    light.kitchen: "off"
rules:
  - name: motion_lights
    priority: 5
    trigger: {type: event, config: {event_name: motion_detected}}
    actions:
      - {type: set_state, target: light.hallway, params: {state: "on"}}
"#,
        )
        .unwrap();

        let config = HubConfig::load(dir.path().join("hub.yaml")).unwrap();

        assert_eq!(config.database, "hub-prod.db");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_delay(), Duration::from_millis(2500));
        assert_eq!(config.redact_keys, vec!["credentials", "card_number"]);
        assert_eq!(config.scenes["evening"]["light.hallway"], "on");
        assert_eq!(config.rules[0]["name"], "motion_lights");
        assert_eq!(config.rules[0]["actions"][0]["params"]["state"], "on");
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hub.yaml"), "").unwrap();

        assert_eq!(
            HubConfig::load(dir.path().join("hub.yaml")).unwrap(),
            HubConfig::default()
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            HubConfig::from_yaml_str("log_level: loud"),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "log_level"
        ));
        assert!(HubConfig::from_yaml_str("history_hours: 0").is_err());
        assert!(HubConfig::from_yaml_str("max_delay_seconds: -1").is_err());
        assert!(HubConfig::from_yaml_str("max_delay_seconds: .nan").is_err());
        assert!(HubConfig::from_yaml_str("scenes: {empty: {}}").is_err());
        assert!(matches!(
            HubConfig::from_yaml_str("databse: typo.db"),
            Err(ConfigError::Shape(_))
        ));
    }

    #[test]
    fn test_huge_max_delay_is_rejected() {
        assert!(matches!(
            HubConfig::from_yaml_str("max_delay_seconds: 1.0e30"),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "max_delay_seconds"
        ));

        let unchecked = HubConfig {
            max_delay_seconds: 1.0e30,
            ..HubConfig::default()
        };
        assert_eq!(unchecked.max_delay(), Duration::ZERO);
    }
}
