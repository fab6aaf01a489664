//! YAML loading with `!include`, `!secret` and `!env_var` resolution

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Loads a YAML document and resolves the hub's custom tags
pub struct YamlLoader {
    secrets: Secrets,
    /// Files currently being loaded, outermost first
    chain: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(secrets: Secrets) -> Self {
        Self {
            secrets,
            chain: Vec::new(),
        }
    }

    /// Loader using the `secrets.yaml` found in `dir`
    pub fn for_dir(dir: &Path) -> ConfigResult<Self> {
        Ok(Self::new(Secrets::load(dir)?))
    }

    /// Load a file and resolve every tag in it
    pub fn load_file(&mut self, path: &Path) -> ConfigResult<Value> {
        if self.chain.iter().any(|p| p == path) {
            return Err(ConfigError::CircularInclude {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loading YAML");

        self.chain.push(path.to_path_buf());
        let result = self.load_str(&content, path);
        self.chain.pop();
        result
    }

    /// Parse YAML text; `origin` anchors relative includes
    pub fn load_str(&mut self, content: &str, origin: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::ParseYaml {
            path: origin.to_path_buf(),
            source,
        })?;
        self.resolve(value, origin)
    }

    fn resolve(&mut self, value: Value, origin: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, origin),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve(value, origin)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item, origin))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            scalar => Ok(scalar),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, origin: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(tag = %tag, "Resolving tag");

        match tag.as_str() {
            "!include" => {
                let target = include_path(&tag_argument(&tag, &tagged.value)?, origin);
                if !target.is_file() {
                    return Err(ConfigError::IncludeNotFound { path: target });
                }
                self.load_file(&target)
            }
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?;
                Ok(Value::String(self.secrets.get(&key)?.to_string()))
            }
            "!env_var" => env_var(&tag_argument(&tag, &tagged.value)?),
            _ => Err(ConfigError::InvalidValue {
                key: tag,
                reason: "unsupported tag".to_string(),
            }),
        }
    }
}

/// Load `path` using the secrets beside it
pub fn load_yaml(path: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    YamlLoader::for_dir(dir)?.load_file(path)
}

fn tag_argument(tag: &str, value: &Value) -> ConfigResult<String> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: tag.to_string(),
            reason: "expected a non-empty string argument".to_string(),
        })
}

fn include_path(raw: &str, origin: &Path) -> PathBuf {
    let raw = Path::new(raw);
    if raw.is_absolute() {
        return raw.to_path_buf();
    }
    origin
        .parent()
        .map(|dir| dir.join(raw))
        .unwrap_or_else(|| raw.to_path_buf())
}

/// `NAME` or `NAME default`; the default is used when NAME is unset
fn env_var(argument: &str) -> ConfigResult<Value> {
    let (name, default) = match argument.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (argument, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(Value::String(value)),
        (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
        (Err(_), None) => Err(ConfigError::EnvVarNotFound {
            var: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        &value[key]
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("rules")).unwrap();
        fs::write(
            dir.path().join("rules/motion.yaml"),
            "- name: motion_lights\n  trigger: {type: event}\n",
        )
        .unwrap();
        fs::write(dir.path().join("hub.yaml"), "rules: !include rules/motion.yaml\n").unwrap();

        let value = load_yaml(dir.path().join("hub.yaml")).unwrap();
        let rules = get(&value, "rules").as_sequence().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(get(&rules[0], "name").as_str(), Some("motion_lights"));
    }

    #[test]
    fn test_secret_substitution() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "db_file: /var/lib/hub.db\n").unwrap();
        fs::write(dir.path().join("hub.yaml"), "database: !secret db_file\n").unwrap();

        let value = load_yaml(dir.path().join("hub.yaml")).unwrap();
        assert_eq!(get(&value, "database").as_str(), Some("/var/lib/hub.db"));
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::set_var("HUB_CONFIG_TEST_LEVEL", "debug");
        let mut loader = YamlLoader::new(Secrets::default());

        let value = loader
            .load_str(
                "a: !env_var HUB_CONFIG_TEST_LEVEL\nb: !env_var HUB_CONFIG_TEST_UNSET fallback\n",
                Path::new("hub.yaml"),
            )
            .unwrap();
        assert_eq!(get(&value, "a").as_str(), Some("debug"));
        assert_eq!(get(&value, "b").as_str(), Some("fallback"));

        let missing = loader.load_str("c: !env_var HUB_CONFIG_TEST_UNSET\n", Path::new("hub.yaml"));
        assert!(matches!(missing, Err(ConfigError::EnvVarNotFound { .. })));

        std::env::remove_var("HUB_CONFIG_TEST_LEVEL");
    }

    #[test]
    fn test_circular_include() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "b: !include b.yaml\n").unwrap();
        fs::write(dir.path().join("b.yaml"), "a: !include a.yaml\n").unwrap();

        let result = load_yaml(dir.path().join("a.yaml"));
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }

    #[test]
    fn test_missing_include_and_unknown_tag() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hub.yaml"), "rules: !include nope.yaml\n").unwrap();
        assert!(matches!(
            load_yaml(dir.path().join("hub.yaml")),
            Err(ConfigError::IncludeNotFound { .. })
        ));

        let mut loader = YamlLoader::new(Secrets::default());
        assert!(loader.load_str("x: !custom foo\n", Path::new("hub.yaml")).is_err());
    }
}
