//! Coordination configuration

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tether_constants::coordination::DEFAULT_ELECTIONS_ROOT;
use tether_constants::coordination::DEFAULT_LOCKS_ROOT;
use tether_constants::network::DEFAULT_WATCH_TIMEOUT_MS;
use tether_kv_types::ConfigError;
use tether_kv_types::normalize_key;

const ENV_LOCKS_ROOT: &str = "TETHER_LOCKS_ROOT";
const ENV_ELECTIONS_ROOT: &str = "TETHER_ELECTIONS_ROOT";
const ENV_WATCH_TIMEOUT_MS: &str = "TETHER_WATCH_TIMEOUT_MS";

/// Key layout and wait bounds shared by the coordination engines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinationConfig {
    /// Directory holding one queue directory per lock name
    pub locks_root: String,
    /// Directory holding one key per election name
    pub elections_root: String,
    /// Bound on a single wait for a predecessor or an election vacancy
    pub wait_timeout_ms: u64,
}

impl CoordinationConfig {
    /// Load coordination configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides to existing configuration
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = lookup(ENV_LOCKS_ROOT) {
            self.locks_root = Self::parse_root(ENV_LOCKS_ROOT, &val)?;
        }
        if let Some(val) = lookup(ENV_ELECTIONS_ROOT) {
            self.elections_root = Self::parse_root(ENV_ELECTIONS_ROOT, &val)?;
        }
        if let Some(val) = lookup(ENV_WATCH_TIMEOUT_MS) {
            self.wait_timeout_ms = ConfigError::parse_millis(ENV_WATCH_TIMEOUT_MS, &val)?;
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    fn parse_root(key: &str, value: &str) -> Result<String, ConfigError> {
        let root = normalize_key(value);
        if root == "/" {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: "must name a directory below the root".to_string(),
            });
        }
        Ok(root)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            locks_root: DEFAULT_LOCKS_ROOT.to_string(),
            elections_root: DEFAULT_ELECTIONS_ROOT.to_string(),
            wait_timeout_ms: DEFAULT_WATCH_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_are_normalized() {
        let mut config = CoordinationConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_LOCKS_ROOT => Some("app//locks/".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.locks_root, "/app/locks");
        assert_eq!(config.elections_root, DEFAULT_ELECTIONS_ROOT);
    }

    #[test]
    fn root_directory_is_rejected() {
        let mut config = CoordinationConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_ELECTIONS_ROOT).then(|| "/".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
