//! Configuration types for ssh-driver.
//!
//! [`DriverConfig`] holds every construction parameter of a driver. It is
//! built in code, from `SSH_DRIVER_*` environment variables ([`env`]) or from
//! a TOML file ([`file`]).

pub mod env;
pub mod file;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::transport::RetryStrategy;
use crate::transport::retry::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default size of a single transfer read.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default terminal type requested with a pty.
pub const DEFAULT_TERM: &str = "vt100";

/// Identity files tried when no explicit key is configured, relative to the
/// home directory.
pub const DEFAULT_IDENTITIES: [&str; 3] = [".ssh/id_rsa", ".ssh/id_dsa", ".ssh/identity"];

/// Resolve [`DEFAULT_IDENTITIES`] against the current home directory.
#[must_use]
pub fn default_identities() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    DEFAULT_IDENTITIES
        .iter()
        .map(|relative| home.join(relative))
        .collect()
}

/// Name of the user running this process.
#[must_use]
pub fn current_user() -> String {
    whoami::username()
}

/// Driver configuration.
#[derive(Clone)]
pub struct DriverConfig {
    /// Host to connect to.
    pub host: String,
    /// Port (default 22).
    pub port: u16,
    /// User to authenticate as (default: current OS user).
    pub user: String,
    /// Password, also used as passphrase for key files.
    pub password: Option<String>,
    /// Explicit private key. When set, no other method is tried.
    pub private_key: Option<PathBuf>,
    /// Whether agent authentication may be attempted.
    pub allow_agent: bool,
    /// Identity files tried in order when no explicit key is set.
    pub identities: Vec<PathBuf>,
    /// TCP connect retry strategy.
    pub retry: RetryStrategy,
    /// Session timeout applied to engine calls and readiness waits.
    pub timeout: Option<Duration>,
    /// Size of a single transfer read.
    pub chunk_size: usize,
    /// Terminal type requested with a pty.
    pub pty_term: String,
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("allow_agent", &self.allow_agent)
            .field("identities", &self.identities)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("chunk_size", &self.chunk_size)
            .field("pty_term", &self.pty_term)
            .finish()
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: current_user(),
            password: None,
            private_key: None,
            allow_agent: true,
            identities: default_identities(),
            retry: RetryStrategy::default(),
            timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            pty_term: DEFAULT_TERM.to_string(),
        }
    }
}

impl DriverConfig {
    /// Create a new config for a host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set user name.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Use an explicit private key.
    #[must_use]
    pub fn private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    /// Allow or forbid agent authentication.
    #[must_use]
    pub const fn allow_agent(mut self, allow: bool) -> Self {
        self.allow_agent = allow;
        self
    }

    /// Replace the identity file candidate list.
    #[must_use]
    pub fn identities<I, P>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.identities = identities.into_iter().map(Into::into).collect();
        self
    }

    /// Set the connect retry strategy.
    #[must_use]
    pub fn retry(mut self, strategy: RetryStrategy) -> Self {
        self.retry = strategy;
        self
    }

    /// Set the number of connect attempts, keeping a fixed delay.
    #[must_use]
    pub fn num_retries(mut self, attempts: u32) -> Self {
        self.retry = RetryStrategy::fixed(self.retry_delay(), attempts);
        self
    }

    /// Set the fixed delay between connect attempts.
    #[must_use]
    pub fn retry_delay_of(mut self, delay: Duration) -> Self {
        self.retry = RetryStrategy::fixed(delay, self.retry.max_attempts());
        self
    }

    /// Set the session timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the transfer chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the terminal type requested with a pty.
    #[must_use]
    pub fn pty_term(mut self, term: impl Into<String>) -> Self {
        self.pty_term = term.into();
        self
    }

    /// Delay between connect attempts under the current strategy.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        match &self.retry {
            RetryStrategy::Fixed { delay, .. } => *delay,
            RetryStrategy::None => DEFAULT_RETRY_DELAY,
        }
    }

    /// Get the address string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
