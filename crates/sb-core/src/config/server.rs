//! Server configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::TargetConfig;

/// Configuration for the shellbridge daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the WebSocket server to
    pub bind_address: String,

    /// Interval between health-check cycles
    #[serde(with = "duration_secs")]
    pub health_check_interval: Duration,

    /// Per-target reachability probe timeout
    #[serde(with = "duration_secs")]
    pub health_probe_timeout: Duration,

    /// Remote connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Transport-level connect attempts (auth failures are never retried)
    pub connect_attempts: u32,

    /// How long to wait for a cancelled task to finish
    #[serde(with = "duration_secs")]
    pub cancel_timeout: Duration,

    /// Where execution history records are appended
    pub history_path: PathBuf,

    /// Named remote targets
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            health_check_interval: Duration::from_secs(30),
            health_probe_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            connect_attempts: 3,
            cancel_timeout: Duration::from_secs(5),
            history_path: config_dir.join("history.jsonl"),
            targets: HashMap::new(),
        }
    }
}

// Helper module for Duration serialization as whole seconds
mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
