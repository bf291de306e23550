//! Environment-based configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::DriverConfig;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "SSH_DRIVER";

/// Recognised variable names (without prefix).
pub mod vars {
    /// Port.
    pub const PORT: &str = "PORT";
    /// User name.
    pub const USER: &str = "USER";
    /// Explicit private key path.
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    /// Number of connect attempts.
    pub const NUM_RETRIES: &str = "NUM_RETRIES";
    /// Delay between connect attempts, in seconds.
    pub const RETRY_DELAY: &str = "RETRY_DELAY";
    /// Session timeout, in seconds.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Whether agent auth is allowed.
    pub const ALLOW_AGENT: &str = "ALLOW_AGENT";
}

/// Environment variable reader.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Values consulted instead of the process environment.
    overrides: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: None,
        }
    }

    /// Read from a fixed map of fully-qualified variable names instead of
    /// the process environment.
    #[must_use]
    pub fn from_map(prefix: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: Some(values),
        }
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        match &self.overrides {
            Some(values) => values.get(&var_name).cloned(),
            None => std::env::var(&var_name).ok(),
        }
    }

    /// Get a parsed value.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in seconds.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_secs)
    }

    /// Apply every variable that is set on top of `config`.
    #[must_use]
    pub fn apply(&self, mut config: DriverConfig) -> DriverConfig {
        if let Some(port) = self.parse::<u16>(vars::PORT) {
            config.port = port;
        }
        if let Some(user) = self.get(vars::USER) {
            config.user = user;
        }
        if let Some(key) = self.get(vars::PRIVATE_KEY) {
            config.private_key = Some(PathBuf::from(key));
        }
        if let Some(delay) = self.duration_secs(vars::RETRY_DELAY) {
            config = config.retry_delay_of(delay);
        }
        if let Some(attempts) = self.parse::<u32>(vars::NUM_RETRIES) {
            config = config.num_retries(attempts);
        }
        if let Some(timeout) = self.duration_secs(vars::TIMEOUT) {
            config.timeout = Some(timeout);
        }
        if let Some(allow) = self.bool(vars::ALLOW_AGENT) {
            config.allow_agent = allow;
        }
        config
    }
}

impl DriverConfig {
    /// Build a config for `host` with `SSH_DRIVER_*` overrides applied.
    #[must_use]
    pub fn from_env(host: impl Into<String>) -> Self {
        EnvConfig::default().apply(Self::new(host))
    }
}
