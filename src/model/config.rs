//! Key/value model configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Model configuration as loaded from a `config.json`.
///
/// The model owns the schema; this type only reads keys, merges updates
/// and swaps whole configs, so values stay untyped JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelConfig {
    values: Map<String, Value>,
}

impl ModelConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(Error::invalid_input(format!(
                "model config must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&content)?)
    }

    /// Overwrite keys with the given values, keeping all other keys
    pub fn update(&mut self, updates: &Map<String, Value>) {
        for (key, value) in updates {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Set a single key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a raw value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get an unsigned integer value
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    /// Get a float value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    /// Get a boolean value
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    /// Get a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Model family, e.g. `t5`
    pub fn model_type(&self) -> Option<&str> {
        self.get_str("model_type")
    }

    /// All keys and values
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_overwrites_only_given_keys() {
        let mut config =
            ModelConfig::from_value(json!({"model_type": "t5", "max_length": 20, "num_beams": 4}))
                .unwrap();

        let updates = json!({"max_length": 3, "early_stopping": true});
        config.update(updates.as_object().unwrap());

        assert_eq!(config.get_u64("max_length"), Some(3));
        assert_eq!(config.get_u64("num_beams"), Some(4));
        assert_eq!(config.get_bool("early_stopping"), Some(true));
        assert_eq!(config.model_type(), Some("t5"));
    }

    #[test]
    fn test_from_file_round_trips_keys() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"model_type": "t5", "d_model": 512, "tie_word_embeddings": false}"#)
            .unwrap();

        let config = ModelConfig::from_file(&path).unwrap();
        assert_eq!(config.as_map().len(), 3);
        assert_eq!(config.get_u64("d_model"), Some(512));
        assert_eq!(config.get_bool("tie_word_embeddings"), Some(false));
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(ModelConfig::from_value(json!("t5")).is_err());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut config = ModelConfig::new();
        config.set("d_model", 512);
        assert_eq!(serde_json::to_value(&config).unwrap(), json!({"d_model": 512}));
    }
}
