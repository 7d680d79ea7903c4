//! DHT configuration

use crate::error::{DhtError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// What a second `put` to an existing key does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Identical bytes are accepted as a no-op, different bytes fail
    #[default]
    RejectConflicting,
    /// Last write wins
    Overwrite,
}

/// Configuration for one DHT instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtConfig {
    /// Protocol identifier the receiver is registered under
    #[serde(default = "default_protocol_id")]
    pub protocol_id: String,

    /// Maximum pending inbound put requests
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timeout for every outbound request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of nodes a hash is announced to
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    #[serde(default)]
    pub overwrite_policy: OverwritePolicy,

    /// Maximum stored value size (bytes)
    #[serde(default = "default_max_value_size")]
    pub max_value_size: usize,
}

fn default_protocol_id() -> String {
    crate::PROTOCOL_ID.to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_replication_factor() -> usize {
    1
}

fn default_max_value_size() -> usize {
    crate::MAX_VALUE_SIZE
}

impl Default for DhtConfig {
    fn default() -> Self {
        DhtConfig {
            protocol_id: default_protocol_id(),
            queue_capacity: default_queue_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
            replication_factor: default_replication_factor(),
            overwrite_policy: OverwritePolicy::default(),
            max_value_size: default_max_value_size(),
        }
    }
}

impl DhtConfig {
    /// Parse from YAML, filling missing fields with defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: DhtConfig =
            serde_yaml::from_str(yaml).map_err(|e| DhtError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| DhtError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Reject settings the DHT cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.protocol_id.is_empty() {
            return Err(DhtError::Config("protocol_id must not be empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(DhtError::Config("queue_capacity must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(DhtError::Config("request_timeout_ms must be positive".into()));
        }
        if self.replication_factor == 0 {
            return Err(DhtError::Config(
                "replication_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DhtConfig::default();
        assert_eq!(config.protocol_id, crate::PROTOCOL_ID);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.overwrite_policy, OverwritePolicy::RejectConflicting);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = DhtConfig::from_yaml_str(
            "queue_capacity: 16\noverwrite_policy: overwrite\nreplication_factor: 3\n",
        )
        .unwrap();

        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.overwrite_policy, OverwritePolicy::Overwrite);
        assert_eq!(config.request_timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            DhtConfig::from_yaml_str("queue_capacity: 0\n"),
            Err(DhtError::Config(_))
        ));
        assert!(matches!(
            DhtConfig::from_yaml_str("replication_factor: 0\n"),
            Err(DhtError::Config(_))
        ));
        assert!(matches!(
            DhtConfig::from_yaml_str("overwrite_policy: sometimes\n"),
            Err(DhtError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "protocol_id: test/dht").unwrap();
        writeln!(file, "request_timeout_ms: 250").unwrap();

        let config = DhtConfig::load(file.path()).unwrap();
        assert_eq!(config.protocol_id, "test/dht");
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_missing_file() {
        let result = DhtConfig::load(Path::new("/nonexistent/hashmesh.yaml"));
        assert!(matches!(result, Err(DhtError::Config(_))));
    }
}
