//! Client configuration

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;
use tether_constants::network::DEFAULT_ENDPOINT;
use tether_constants::network::DEFAULT_REQUEST_TIMEOUT_MS;
use tether_constants::network::DEFAULT_WATCH_TIMEOUT_MS;
use tether_kv_types::ConfigError;

const ENV_ENDPOINT: &str = "TETHER_ENDPOINT";
const ENV_REQUEST_TIMEOUT_MS: &str = "TETHER_REQUEST_TIMEOUT_MS";
const ENV_WATCH_TIMEOUT_MS: &str = "TETHER_WATCH_TIMEOUT_MS";

/// Connection settings for [`EtcdClient`](crate::EtcdClient).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the store, e.g. `http://127.0.0.1:2379`
    pub endpoint: String,
    /// Timeout for reads and writes
    pub request_timeout_ms: u64,
    /// Bound on a single long-poll watch
    pub watch_timeout_ms: u64,
}

impl ClientConfig {
    /// Load client configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides to existing configuration
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, validating the result.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = lookup(ENV_ENDPOINT) {
            self.endpoint = val;
        }
        if let Some(val) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            self.request_timeout_ms = ConfigError::parse_millis(ENV_REQUEST_TIMEOUT_MS, &val)?;
        }
        if let Some(val) = lookup(ENV_WATCH_TIMEOUT_MS) {
            self.watch_timeout_ms = ConfigError::parse_millis(ENV_WATCH_TIMEOUT_MS, &val)?;
        }
        self.endpoint_url()?;
        Ok(())
    }

    /// Parsed endpoint.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: ENV_ENDPOINT.to_string(),
                hint: "set it to the store's client URL".to_string(),
            });
        }
        let url = Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidValue {
            key: ENV_ENDPOINT.to_string(),
            value: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                key: ENV_ENDPOINT.to_string(),
                value: self.endpoint.clone(),
                reason: "must be an http(s) base URL".to_string(),
            });
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_timeout_ms)
    }

    // Default value functions
    fn default_endpoint() -> String {
        DEFAULT_ENDPOINT.to_string()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            watch_timeout_ms: DEFAULT_WATCH_TIMEOUT_MS,
        }
    }
}
