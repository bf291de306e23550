//! Authentication fallback chain.
//!
//! The order in which credentials are tried is data: an [`AuthPlan`] is an
//! ordered list of [`Credential`]s built from the driver configuration, and
//! [`authenticate`] walks it with fixed per-variant rules:
//!
//! - an explicit [`Credential::PublicKeyFile`] failure is fatal;
//! - [`Credential::Agent`] and [`Credential::IdentityFile`] failures are
//!   logged and the next credential is tried;
//! - [`Credential::Password`] is the last resort and its failure is fatal.
//!
//! Every attempt goes through the pump. Wait failures (timeout,
//! cancellation) always abort the chain.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::DriverConfig;
use crate::engine::SessionEngine;
use crate::error::{DriverError, EngineError, Result};
use crate::pump::{Pump, Readiness};

/// One way of proving identity to the server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Explicitly configured private key.
    PublicKeyFile {
        /// Private key path.
        path: PathBuf,
        /// Key passphrase.
        passphrase: Option<String>,
    },
    /// Keys held by a running agent.
    Agent,
    /// Default-location private key.
    IdentityFile {
        /// Private key path.
        path: PathBuf,
    },
    /// Password.
    Password {
        /// The password.
        secret: String,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicKeyFile { path, passphrase } => f
                .debug_struct("PublicKeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Agent => f.write_str("Agent"),
            Self::IdentityFile { path } => {
                f.debug_struct("IdentityFile").field("path", path).finish()
            }
            Self::Password { .. } => f
                .debug_struct("Password")
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Kind of a [`Credential`], without its secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    /// Explicit key file.
    PublicKeyFile,
    /// Agent.
    Agent,
    /// Identity file.
    IdentityFile,
    /// Password.
    Password,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicKeyFile => f.write_str("public key file"),
            Self::Agent => f.write_str("agent"),
            Self::IdentityFile => f.write_str("identity file"),
            Self::Password => f.write_str("password"),
        }
    }
}

impl Credential {
    /// The kind of this credential.
    #[must_use]
    pub const fn method(&self) -> AuthMethod {
        match self {
            Self::PublicKeyFile { .. } => AuthMethod::PublicKeyFile,
            Self::Agent => AuthMethod::Agent,
            Self::IdentityFile { .. } => AuthMethod::IdentityFile,
            Self::Password { .. } => AuthMethod::Password,
        }
    }
}

/// `<path>.pub`.
#[must_use]
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut path = OsString::from(private_key.as_os_str());
    path.push(".pub");
    PathBuf::from(path)
}

/// Ordered credentials for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPlan {
    user: String,
    credentials: Vec<Credential>,
    passphrase: Option<String>,
}

impl AuthPlan {
    /// Empty plan for `user`.
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            credentials: Vec::new(),
            passphrase: None,
        }
    }

    /// Build the plan a driver uses for `config`.
    ///
    /// An explicit private key is the only credential when configured.
    /// Otherwise: agent (if allowed), each identity file, then the password
    /// if one is set. The password doubles as identity file passphrase.
    #[must_use]
    pub fn from_config(config: &DriverConfig) -> Self {
        let mut plan = Self::new(config.user.clone());
        plan.passphrase.clone_from(&config.password);

        if let Some(key) = &config.private_key {
            return plan.with(Credential::PublicKeyFile {
                path: key.clone(),
                passphrase: config.password.clone(),
            });
        }
        if config.allow_agent {
            plan = plan.with(Credential::Agent);
        }
        for identity in &config.identities {
            plan = plan.with(Credential::IdentityFile {
                path: identity.clone(),
            });
        }
        if let Some(secret) = &config.password {
            plan = plan.with(Credential::Password {
                secret: secret.clone(),
            });
        }
        plan
    }

    /// Append a credential.
    #[must_use]
    pub fn with(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// User to authenticate as.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Credentials in evaluation order.
    #[must_use]
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }
}

async fn try_key_file<E, R>(
    engine: &mut E,
    pump: &Pump<R>,
    user: &str,
    path: &Path,
    passphrase: Option<&str>,
) -> Result<std::result::Result<(), EngineError>>
where
    E: SessionEngine,
    R: Readiness,
{
    let public = public_key_path(path);
    let public = public.is_file().then_some(public);
    pump.drive(|| engine.auth_public_key_file(user, public.as_deref(), path, passphrase))
        .await
}

/// Walk `plan` against `engine` until a credential is accepted.
///
/// Returns the method that succeeded.
pub async fn authenticate<E, R>(
    engine: &mut E,
    pump: &Pump<R>,
    port: u16,
    plan: &AuthPlan,
) -> Result<AuthMethod>
where
    E: SessionEngine,
    R: Readiness,
{
    let host = pump.host().to_string();
    let user = plan.user();
    let failed = |reason: String| DriverError::authentication(&host, port, user, reason);

    for credential in plan.credentials() {
        let method = credential.method();
        let outcome = match credential {
            Credential::PublicKeyFile { path, passphrase } => {
                tracing::debug!(host = %host, user = %user, key = %path.display(), "attempting public key file authentication");
                try_key_file(engine, pump, user, path, passphrase.as_deref())
                    .await?
                    .map_err(|e| failed(format!("public key {} rejected - {e}", path.display())))
                    .map(|()| true)?
            }
            Credential::Agent => match pump.drive(|| engine.auth_agent(user)).await? {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(host = %host, error = %err, "agent authentication failed, continuing with other methods");
                    false
                }
            },
            Credential::IdentityFile { path } => {
                if !path.is_file() {
                    continue;
                }
                tracing::debug!(host = %host, identity = %path.display(), "trying identity file");
                match try_key_file(engine, pump, user, path, plan.passphrase.as_deref()).await? {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::debug!(host = %host, identity = %path.display(), error = %err, "identity file authentication failed, continuing");
                        false
                    }
                }
            }
            Credential::Password { secret } => {
                tracing::debug!(host = %host, user = %user, "public key auth failed, trying password");
                pump.drive(|| engine.auth_password(user, secret))
                    .await?
                    .map_err(|e| failed(format!("password authentication failed - {e}")))
                    .map(|()| true)?
            }
        };

        if outcome {
            tracing::info!(host = %host, user = %user, %method, "authenticated");
            return Ok(method);
        }
    }

    Err(failed("no authentication methods succeeded".to_string()))
}
