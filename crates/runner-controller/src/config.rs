//! Graceful stop configuration
//!
//! Loaded from a YAML file mounted into the controller pod. Every key is
//! optional and falls back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How long to keep retrying the list + remove combo before deleting the pod anyway.
///
/// Keep this at 60 seconds or more: GitHub serves the runner list with
/// `max-age=60`, so a freshly registered runner can stay invisible that long.
pub const DEFAULT_UNREGISTRATION_TIMEOUT_SECONDS: u64 = 60;

/// Delay between ticks while unregistration is in progress.
pub const DEFAULT_UNREGISTRATION_RETRY_DELAY_SECONDS: u64 = 30;

/// Delay between ticks after GitHub rejected a call for exceeding the rate limit.
pub const DEFAULT_RATE_LIMIT_RETRY_DELAY_SECONDS: u64 = 300;

/// Name of the container running the actions runner.
pub const DEFAULT_RUNNER_CONTAINER_NAME: &str = "runner";

/// Graceful stop configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GracefulStopConfig {
    /// Grace period after the start marker, in seconds
    pub unregistration_timeout_seconds: u64,

    /// Requeue delay while waiting on unregistration, in seconds
    pub unregistration_retry_delay_seconds: u64,

    /// Requeue delay after a GitHub rate limit error, in seconds
    pub rate_limit_retry_delay_seconds: u64,

    /// Container whose successful exit means the runner deregistered itself
    pub runner_container_name: String,
}

impl Default for GracefulStopConfig {
    fn default() -> Self {
        Self {
            unregistration_timeout_seconds: DEFAULT_UNREGISTRATION_TIMEOUT_SECONDS,
            unregistration_retry_delay_seconds: DEFAULT_UNREGISTRATION_RETRY_DELAY_SECONDS,
            rate_limit_retry_delay_seconds: DEFAULT_RATE_LIMIT_RETRY_DELAY_SECONDS,
            runner_container_name: DEFAULT_RUNNER_CONTAINER_NAME.to_string(),
        }
    }
}

impl GracefulStopConfig {
    /// Load configuration from a mounted YAML file
    pub fn from_mounted_file(config_path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config file {config_path}: {e}")))?;

        Self::from_yaml(&config_str)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(config_str: &str) -> Result<Self> {
        serde_yaml::from_str(config_str)
            .map_err(|e| Error::Config(format!("Failed to parse config YAML: {e}")))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.unregistration_timeout_seconds == 0 {
            return Err(Error::Config(
                "unregistrationTimeoutSeconds must be greater than zero".to_string(),
            ));
        }

        if self.unregistration_retry_delay_seconds == 0 {
            return Err(Error::Config(
                "unregistrationRetryDelaySeconds must be greater than zero".to_string(),
            ));
        }

        if self.rate_limit_retry_delay_seconds <= self.unregistration_retry_delay_seconds {
            return Err(Error::Config(format!(
                "rateLimitRetryDelaySeconds ({}) must be greater than unregistrationRetryDelaySeconds ({})",
                self.rate_limit_retry_delay_seconds, self.unregistration_retry_delay_seconds
            )));
        }

        if self.runner_container_name.trim().is_empty() {
            return Err(Error::Config(
                "runnerContainerName must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn unregistration_timeout(&self) -> Duration {
        Duration::from_secs(self.unregistration_timeout_seconds)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.unregistration_retry_delay_seconds)
    }

    /// Requeue delay after a rate limit error.
    ///
    /// Never shorter than twice the regular retry delay, even when an
    /// unvalidated configuration asks for less.
    #[must_use]
    pub fn rate_limit_retry_delay(&self) -> Duration {
        let floor = self
            .retry_delay()
            .saturating_mul(2)
            .max(Duration::from_secs(1));
        Duration::from_secs(self.rate_limit_retry_delay_seconds).max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
unregistrationTimeoutSeconds: 120
unregistrationRetryDelaySeconds: 15
rateLimitRetryDelaySeconds: 600
runnerContainerName: "actions-runner"
"#;

        let config = GracefulStopConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.unregistration_timeout(), Duration::from_secs(120));
        assert_eq!(config.retry_delay(), Duration::from_secs(15));
        assert_eq!(config.rate_limit_retry_delay(), Duration::from_secs(600));
        assert_eq!(config.runner_container_name, "actions-runner");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = GracefulStopConfig::from_yaml("unregistrationTimeoutSeconds: 90\n").unwrap();
        assert_eq!(config.unregistration_timeout_seconds, 90);
        assert_eq!(
            config.unregistration_retry_delay_seconds,
            DEFAULT_UNREGISTRATION_RETRY_DELAY_SECONDS
        );
        assert_eq!(config.runner_container_name, DEFAULT_RUNNER_CONTAINER_NAME);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(GracefulStopConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_rate_limit_delay() {
        let config = GracefulStopConfig {
            rate_limit_retry_delay_seconds: 30,
            unregistration_retry_delay_seconds: 30,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let zero_timeout = GracefulStopConfig {
            unregistration_timeout_seconds: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());

        let zero_delay = GracefulStopConfig {
            unregistration_retry_delay_seconds: 0,
            ..Default::default()
        };
        assert!(zero_delay.validate().is_err());
    }

    #[test]
    fn test_rate_limit_delay_always_exceeds_retry_delay() {
        for (retry, rate_limit) in [
            (0, 0),
            (30, 0),
            (30, 30),
            (30, 31),
            (30, 3600),
            (u64::MAX, 1),
        ] {
            let config = GracefulStopConfig {
                unregistration_retry_delay_seconds: retry,
                rate_limit_retry_delay_seconds: rate_limit,
                ..Default::default()
            };
            assert!(
                config.rate_limit_retry_delay() > config.retry_delay(),
                "retry={retry} rate_limit={rate_limit}"
            );
        }
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        assert!(matches!(
            GracefulStopConfig::from_yaml("unregistrationTimeoutSeconds: soon"),
            Err(Error::Config(_))
        ));
    }
}
