//! Session configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::Identity;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("package_name must not be empty")]
    MissingPackageName,
}

/// Configuration for one session initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// User the session is bound to.
    pub identity: Identity,

    /// Application package the platform associates events with.
    pub package_name: String,

    /// Arbitrary metadata for app-specific needs.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl SessionConfig {
    #[must_use]
    pub fn new(identity: Identity, package_name: impl Into<String>) -> Self {
        Self {
            identity,
            package_name: package_name.into(),
            metadata: HashMap::new(),
        }
    }

    /// Parse a config from a JSON document.
    ///
    /// # Errors
    /// Returns error if the document is invalid, the identity is blank,
    /// or the package name is empty.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.package_name.trim().is_empty() {
            return Err(ConfigError::MissingPackageName);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let config = SessionConfig::from_json(
            r#"{"identity": "alice@example.com", "package_name": "web-demo", "metadata": {"env": "dev"}}"#,
        )
        .unwrap();
        assert_eq!(config.identity.as_str(), "alice@example.com");
        assert_eq!(config.get_metadata("env"), Some(&Value::from("dev")));
    }

    #[test]
    fn test_from_json_rejects_blank_fields() {
        assert!(matches!(
            SessionConfig::from_json(r#"{"identity": "a@b.c", "package_name": " "}"#),
            Err(ConfigError::MissingPackageName)
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"identity": "", "package_name": "x"}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
