//! Configuration for the automation hub
//!
//! `hub.yaml` is plain YAML plus three custom tags:
//!
//! - `!include path` - Include another YAML file (relative to the including file)
//! - `!secret key` - Substitute from `secrets.yaml` beside the config file
//! - `!env_var NAME [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use hub_config::HubConfig;
//!
//! let config = HubConfig::load("/etc/automation-hub/hub.yaml")?;
//! println!("database at {}", config.database);
//! ```

mod error;
mod hub_config;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use hub_config::HubConfig;
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;
