//! Key/value configuration sources.

use crate::core::{DispatchError, DispatchResult};

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::RwLock;

/// A simple typed key lookup.
///
/// Keys are dotted paths such as `backends.search-a.timeout_ms`. A missing
/// key, or a value of the wrong type, yields the supplied default.
pub trait ConfigSource: Send + Sync + Debug {
    /// Looks up a 32-bit integer.
    fn get_int(&self, key: &str, default: i32) -> i32;

    /// Looks up a 64-bit integer.
    fn get_long(&self, key: &str, default: i64) -> i64;

    /// Looks up a boolean.
    fn get_bool(&self, key: &str, default: bool) -> bool;
}

/// Configuration backed by a flattened TOML document.
///
/// Nested tables are flattened into dotted keys, so
///
/// ```toml
/// [resilience]
/// timeout_ms = 2000
///
/// [backends.search-a]
/// max_retries = 2
///
/// [tenants.acme.backends.search-a]
/// disabled = true
/// ```
///
/// yields `resilience.timeout_ms`, `backends.search-a.max_retries` and
/// `tenants.acme.backends.search-a.disabled`. Values can also be set at
/// runtime with [`LayeredConfig::set`].
#[derive(Debug, Default)]
pub struct LayeredConfig {
    values: RwLock<BTreeMap<String, toml::Value>>,
}

impl LayeredConfig {
    /// Creates an empty configuration. Every lookup returns its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> DispatchResult<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| DispatchError::configuration(format!("invalid TOML: {e}")))?;

        let mut values = BTreeMap::new();
        for (key, value) in &table {
            flatten(key, value, &mut values);
        }

        Ok(Self {
            values: RwLock::new(values),
        })
    }

    /// Reads and parses a TOML file.
    pub async fn load(path: &Path) -> DispatchResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DispatchError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), keys = config.len(), "Loaded configuration");
        Ok(config)
    }

    /// Sets a value, replacing any previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<toml::Value>) {
        let mut values = self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.insert(key.into(), value.into());
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> bool {
        let mut values = self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.remove(key).is_some()
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` if no keys are set.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<toml::Value> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

impl ConfigSource for LayeredConfig {
    fn get_int(&self, key: &str, default: i32) -> i32 {
        let value = self.get_long(key, i64::from(default));
        match i32::try_from(value) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value, "Configuration value out of range, using default");
                default
            }
        }
    }

    fn get_long(&self, key: &str, default: i64) -> i64 {
        match self.lookup(key) {
            None => default,
            Some(toml::Value::Integer(value)) => value,
            Some(toml::Value::String(text)) => text.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %text, "Expected an integer, using default");
                default
            }),
            Some(other) => {
                tracing::warn!(key, kind = other.type_str(), "Expected an integer, using default");
                default
            }
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.lookup(key) {
            None => default,
            Some(toml::Value::Boolean(value)) => value,
            Some(toml::Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => {
                    tracing::warn!(key, value = %text, "Expected a boolean, using default");
                    default
                }
            },
            Some(other) => {
                tracing::warn!(key, kind = other.type_str(), "Expected a boolean, using default");
                default
            }
        }
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut BTreeMap<String, toml::Value>) {
    match value {
        toml::Value::Table(table) => {
            for (key, nested) in table {
                flatten(&format!("{prefix}.{key}"), nested, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[resilience]
timeout_ms = 2000
max_retries = "2"

[backends.search-a]
disabled = true
cool_down_ms = 45000

[tenants.acme.backends.search-a]
disabled = false
"#;

    #[test]
    fn test_flattened_lookup() {
        let config = LayeredConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.get_long("resilience.timeout_ms", 0), 2000);
        assert_eq!(config.get_int("resilience.max_retries", 0), 2);
        assert!(config.get_bool("backends.search-a.disabled", false));
        assert_eq!(config.get_long("backends.search-a.cool_down_ms", 0), 45_000);
        assert!(!config.get_bool("tenants.acme.backends.search-a.disabled", true));
    }

    #[test]
    fn test_missing_and_mistyped_keys_use_default() {
        let config = LayeredConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.get_long("resilience.unknown", 7), 7);
        assert_eq!(config.get_int("backends.search-a.disabled", 3), 3);
        assert!(config.get_bool("resilience.timeout_ms", true));
    }

    #[test]
    fn test_int_out_of_range_uses_default() {
        let config = LayeredConfig::new();
        config.set("resilience.timeout_ms", i64::MAX);
        assert_eq!(config.get_int("resilience.timeout_ms", 5), 5);
        assert_eq!(config.get_long("resilience.timeout_ms", 5), i64::MAX);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = LayeredConfig::from_toml_str("this is not { valid toml").unwrap_err();
        assert!(matches!(err, DispatchError::Configuration { .. }));
    }

    #[test]
    fn test_set_and_remove() {
        let config = LayeredConfig::new();
        assert!(config.is_empty());

        config.set("backends.b.disabled", true);
        assert!(config.get_bool("backends.b.disabled", false));

        assert!(config.remove("backends.b.disabled"));
        assert!(!config.get_bool("backends.b.disabled", false));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("routeguard.toml");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let config = LayeredConfig::load(&path).await.unwrap();
        assert_eq!(config.get_long("resilience.timeout_ms", 0), 2000);

        let missing = LayeredConfig::load(&dir.path().join("absent.toml")).await;
        assert!(missing.is_err());
    }
}
