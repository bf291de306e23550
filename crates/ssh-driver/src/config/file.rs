//! File-based configuration loading.
//!
//! A configuration file is TOML with a `[driver]` table:
//!
//! ```toml
//! [driver]
//! host = "build01.example.com"
//! port = 2222
//! user = "deploy"
//! num_retries = 5
//! retry_delay = 2
//! timeout = 30
//! identities = ["~/.ssh/id_ed25519"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::DriverConfig;
use crate::error::{DriverError, Result};

/// Default configuration file name.
pub const DEFAULT_FILE_NAME: &str = "ssh-driver.toml";

/// On-disk representation of a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// The `[driver]` table.
    #[serde(default)]
    pub driver: DriverSection,
}

/// The `[driver]` table. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverSection {
    /// Host to connect to.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Explicit private key.
    pub private_key: Option<PathBuf>,
    /// Whether agent auth is allowed.
    pub allow_agent: Option<bool>,
    /// Identity file candidates.
    pub identities: Option<Vec<PathBuf>>,
    /// Connect attempts.
    pub num_retries: Option<u32>,
    /// Delay between attempts, in seconds.
    pub retry_delay: Option<u64>,
    /// Session timeout, in seconds.
    pub timeout: Option<u64>,
    /// Transfer chunk size in bytes.
    pub chunk_size: Option<usize>,
    /// Terminal type for pty requests.
    pub pty_term: Option<String>,
}

impl DriverSection {
    /// Apply every field that is set on top of `config`.
    #[must_use]
    pub fn apply(&self, mut config: DriverConfig) -> DriverConfig {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.user.clone_from(user);
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(key) = &self.private_key {
            config.private_key = Some(expand_home(key));
        }
        if let Some(allow) = self.allow_agent {
            config.allow_agent = allow;
        }
        if let Some(identities) = &self.identities {
            config.identities = identities.iter().map(|p| expand_home(p)).collect();
        }
        if let Some(delay) = self.retry_delay {
            config = config.retry_delay_of(Duration::from_secs(delay));
        }
        if let Some(attempts) = self.num_retries {
            config = config.num_retries(attempts);
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Some(Duration::from_secs(timeout));
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size.max(1);
        }
        if let Some(term) = &self.pty_term {
            config.pty_term.clone_from(term);
        }
        config
    }
}

/// Expand a leading `~/` against the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Parse configuration file content.
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    toml::from_str(content).map_err(|e| DriverError::config(e.to_string()))
}

/// Configuration file loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Search paths.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a search path.
    #[must_use]
    pub fn add_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Find a config file by name in the search paths.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load a config file.
    pub fn load(&self, path: &Path) -> Result<ConfigFile> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {}
            _ => {
                return Err(DriverError::config(format!(
                    "unsupported config format: {}",
                    path.display()
                )));
            }
        }
        let content = std::fs::read_to_string(path)?;
        parse_config(&content)
    }

    /// Find [`DEFAULT_FILE_NAME`] and apply it on top of the defaults.
    pub fn load_driver_config(&self) -> Result<DriverConfig> {
        let path = self.find(DEFAULT_FILE_NAME).ok_or_else(|| {
            DriverError::config(format!("config file not found: {DEFAULT_FILE_NAME}"))
        })?;
        let file = self.load(&path)?;
        let config = file.driver.apply(DriverConfig::default());
        if config.host.is_empty() {
            return Err(DriverError::config(format!(
                "{} does not name a host",
                path.display()
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_driver_section() {
        let content = r#"
            [driver]
            host = "build01"
            port = 2222
            num_retries = 5
            retry_delay = 2
            timeout = 30
            allow_agent = false
        "#;

        let file = parse_config(content).unwrap();
        let config = file.driver.apply(DriverConfig::default());
        assert_eq!(config.host, "build01");
        assert_eq!(config.port, 2222);
        assert_eq!(config.retry.max_attempts(), 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(!config.allow_agent);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = parse_config("[driver]\nhostname = \"x\"\n").unwrap_err();
        assert!(matches!(err, DriverError::Config { .. }));
    }

    #[test]
    fn loader_finds_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_FILE_NAME),
            "[driver]\nhost = \"db01\"\nuser = \"ops\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .add_path("/nonexistent")
            .add_path(dir.path())
            .load_driver_config()
            .unwrap();
        assert_eq!(config.host, "db01");
        assert_eq!(config.user, "ops");
    }

    #[test]
    fn missing_host_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_FILE_NAME), "[driver]\nport = 22\n").unwrap();

        let err = ConfigLoader::new()
            .add_path(dir.path())
            .load_driver_config()
            .unwrap_err();
        assert!(err.to_string().contains("does not name a host"));
    }
}
