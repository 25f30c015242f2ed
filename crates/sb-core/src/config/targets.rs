//! Remote target registry
//!
//! Maps logical target names (e.g. "mdwap1p") to connection parameters.
//! Lookup is case-insensitive; the fleet is fixed at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;

/// Connection parameters for one remote target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Remote host address
    pub host: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_port() -> u16 {
    22
}

/// Registry of configured remote targets
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: HashMap<String, TargetConfig>,
}

impl TargetRegistry {
    /// Build a registry from configured targets, normalizing names
    pub fn new(targets: HashMap<String, TargetConfig>) -> Self {
        let targets = targets
            .into_iter()
            .map(|(name, config)| (name.to_lowercase(), config))
            .collect();
        Self { targets }
    }

    /// Resolve a target name to its connection parameters
    pub fn resolve(&self, name: &str) -> Result<&TargetConfig, ConfigError> {
        self.targets
            .get(&name.to_lowercase())
            .ok_or_else(|| ConfigError::TargetNotFound {
                name: name.to_string(),
            })
    }

    /// Iterate over all configured targets
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TargetConfig)> {
        self.targets.iter()
    }

    /// Number of configured targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if no targets are configured
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TargetRegistry {
        let mut map = HashMap::new();
        map.insert(
            "MDWAP1P".to_string(),
            TargetConfig {
                host: "10.0.0.1".into(),
                port: 22,
                username: "batch".into(),
                password: "secret".into(),
                description: None,
            },
        );
        TargetRegistry::new(map)
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = sample();
        assert_eq!(registry.resolve("mdwap1p").unwrap().host, "10.0.0.1");
        assert_eq!(registry.resolve("MdWaP1P").unwrap().host, "10.0.0.1");
    }

    #[test]
    fn test_resolve_unknown_target_fails() {
        let registry = sample();
        let err = registry.resolve("missing").unwrap_err();
        assert!(matches!(err, ConfigError::TargetNotFound { name } if name == "missing"));
    }

    #[test]
    fn test_port_defaults_to_22() {
        let config: TargetConfig = toml::from_str(
            r#"
            host = "10.0.0.2"
            username = "batch"
            password = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 22);
    }
}
