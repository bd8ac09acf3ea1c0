//! Operator configuration from environment variables

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },

    #[error("{name} must be a valid port, got {value:?}")]
    InvalidPort { name: &'static str, value: String },

    #[error("{0}")]
    Inconsistent(String),
}

/// Process-wide settings shared by both controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Re-observation interval for stable resources
    pub resync_interval: Duration,
    /// Default poll interval while waiting on a remote state
    pub poll_interval: Duration,
    /// Bound on any wait for a remote state
    pub max_wait: Duration,
    /// Requeue delay after a remote conflict
    pub conflict_requeue: Duration,
    /// Bound applied to every remote call
    pub remote_call_timeout: Duration,
    /// Restrict the controllers to one namespace
    pub watch_namespace: Option<String>,
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(900),
            conflict_requeue: Duration::from_secs(5),
            remote_call_timeout: Duration::from_secs(30),
            watch_namespace: None,
            health_port: 8080,
        }
    }
}

impl OperatorConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let seconds = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                    _ => Err(ConfigError::InvalidSeconds { name, value }),
                },
            }
        };

        let health_port = match lookup("HEALTH_PORT") {
            None => defaults.health_port,
            Some(value) => match value.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    return Err(ConfigError::InvalidPort {
                        name: "HEALTH_PORT",
                        value,
                    });
                }
            },
        };

        let config = Self {
            resync_interval: seconds("RESYNC_INTERVAL_SECS", defaults.resync_interval)?,
            poll_interval: seconds("POLL_INTERVAL_SECS", defaults.poll_interval)?,
            max_wait: seconds("MAX_WAIT_SECS", defaults.max_wait)?,
            conflict_requeue: seconds("CONFLICT_REQUEUE_SECS", defaults.conflict_requeue)?,
            remote_call_timeout: seconds(
                "REMOTE_CALL_TIMEOUT_SECS",
                defaults.remote_call_timeout,
            )?,
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            health_port,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval > self.max_wait {
            return Err(ConfigError::Inconsistent(format!(
                "POLL_INTERVAL_SECS ({}) exceeds MAX_WAIT_SECS ({})",
                self.poll_interval.as_secs(),
                self.max_wait.as_secs()
            )));
        }
        Ok(())
    }
}
