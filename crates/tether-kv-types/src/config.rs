//! Configuration error shared by the env-loaded config structs.

use snafu::Snafu;

/// Configuration error types
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue { key: String, value: String, reason: String },

    /// A required configuration value is missing
    #[snafu(display("missing required configuration: {key} ({hint})"))]
    MissingRequired { key: String, hint: String },
}

impl ConfigError {
    /// Parse an environment variable value as milliseconds.
    pub fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
        let millis = value.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: format!("must be a number of milliseconds: {}", e),
        })?;
        if millis == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_millis_rejects_garbage_and_zero() {
        assert_eq!(ConfigError::parse_millis("T", " 250 ").unwrap(), 250);
        assert!(matches!(ConfigError::parse_millis("T", "soon"), Err(ConfigError::InvalidValue { .. })));
        let err = ConfigError::parse_millis("T", "0").unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration for T: '0' (must be greater than zero)");
    }
}
