//! The per-host driver.
//!
//! A [`Driver`] owns one authenticated session. Every protocol operation
//! takes `&mut self`, so a driver has at most one operation in flight; two
//! drivers share nothing and can run on separate tasks.
//!
//! ```rust,no_run
//! use ssh_driver::{CommandOptions, DriverConfig, SshClient};
//!
//! # async fn run() -> ssh_driver::Result<()> {
//! let mut client = SshClient::connect(DriverConfig::new("web01").user("deploy")).await?;
//! let mut run = client.run_command("uptime", CommandOptions::new()).await?;
//! for line in run.stdout.collect().await? {
//!     println!("{line}");
//! }
//! client.wait_finished(Some(&mut run.channel)).await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::auth::{AuthMethod, AuthPlan, authenticate};
use crate::channel::{Channel, compose_command, open_and_execute};
use crate::config::DriverConfig;
use crate::encoding::Encoding;
use crate::engine::{ChannelEngine, SessionEngine, StreamKind};
use crate::error::{DriverError, Result};
use crate::output::HostOutput;
use crate::pump::{Pump, Readiness};
use crate::sftp::{GetJob, PutJob, SftpSession, transfer};
use crate::transport::{Connector, establish};

/// Channel type of a driver over engine `E`.
pub type DriverChannel<E, R> = Channel<<E as SessionEngine>::Channel, R>;

/// Output sequence type of a driver over engine `E`.
pub type DriverOutput<E, R> =
    HostOutput<<<E as SessionEngine>::Channel as ChannelEngine>::Stream, R>;

/// How [`Driver::run_command`] wraps and runs a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Run through `sudo`.
    pub sudo: bool,
    /// Run as this user through `sudo -u`.
    pub user: Option<String>,
    /// Shell to run the command with instead of `$SHELL -c`.
    pub shell: Option<String>,
    /// Request a pseudo-terminal.
    pub use_pty: bool,
    /// Encoding of the command's output.
    pub encoding: Encoding,
}

impl CommandOptions {
    /// Run the command as given.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run through `sudo`.
    #[must_use]
    pub const fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// Run as `user`.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Run with `shell`.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Request a pseudo-terminal.
    #[must_use]
    pub const fn pty(mut self) -> Self {
        self.use_pty = true;
        self
    }

    /// Decode output with `encoding`.
    #[must_use]
    pub const fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// A running command: its channel and both output sequences.
pub struct CommandOutput<E: SessionEngine, R> {
    /// Host the command runs on.
    pub host: String,
    /// The channel. Close it with [`Driver::wait_finished`] once drained.
    pub channel: DriverChannel<E, R>,
    /// Standard output lines.
    pub stdout: DriverOutput<E, R>,
    /// Standard error lines.
    pub stderr: DriverOutput<E, R>,
}

impl<E: SessionEngine, R> std::fmt::Debug for CommandOutput<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandOutput")
            .field("host", &self.host)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Driver for one SSH connection.
pub struct Driver<E: SessionEngine, R> {
    engine: E,
    pump: Pump<R>,
    config: DriverConfig,
    auth_method: AuthMethod,
    sftp: Option<SftpSession<E::Sftp, R>>,
}

impl<E: SessionEngine, R> std::fmt::Debug for Driver<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("user", &self.config.user)
            .field("auth_method", &self.auth_method)
            .field("sftp", &self.sftp.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: SessionEngine, R: Readiness> Driver<E, R> {
    /// Connect through `connector`, attach the socket to an engine, then
    /// handshake and authenticate.
    pub async fn connect_with<C, F>(config: DriverConfig, connector: &C, attach: F) -> Result<Self>
    where
        C: Connector,
        F: FnOnce(C::Stream) -> io::Result<(E, R)>,
    {
        let stream = establish(connector, &config.host, config.port, &config.retry).await?;
        let (engine, readiness) = attach(stream)?;
        Self::from_engine(config, engine, readiness).await
    }

    /// Handshake and authenticate over an engine whose socket is connected.
    pub async fn from_engine(config: DriverConfig, mut engine: E, readiness: R) -> Result<Self> {
        let pump = Pump::new(readiness, config.host.as_str()).with_timeout(config.timeout);

        engine.set_timeout(config.timeout);
        engine.set_blocking(false);

        pump.drive(|| engine.handshake())
            .await?
            .map_err(|source| DriverError::Session {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;
        tracing::debug!(host = %config.host, port = config.port, "handshake complete");

        let plan = AuthPlan::from_config(&config);
        let auth_method = authenticate(&mut engine, &pump, config.port, &plan).await?;

        Ok(Self {
            engine,
            pump,
            config,
            auth_method,
            sftp: None,
        })
    }

    /// Host this driver is connected to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Configuration the driver was built with.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Credential kind that authenticated the session.
    #[must_use]
    pub const fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// Token that aborts any readiness wait of this driver when cancelled.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        self.pump.cancellation()
    }

    fn pty_term(&self, use_pty: bool) -> Option<&str> {
        use_pty.then_some(self.config.pty_term.as_str())
    }

    /// Open a channel and execute `command` on it.
    pub async fn execute(&mut self, command: &str, use_pty: bool) -> Result<DriverChannel<E, R>> {
        let term = use_pty.then(|| self.config.pty_term.clone());
        open_and_execute(&mut self.engine, &self.pump, command, term.as_deref()).await
    }

    /// Execute `command` on an already open channel.
    pub async fn execute_on(
        &mut self,
        channel: &mut DriverChannel<E, R>,
        command: &str,
        use_pty: bool,
    ) -> Result<()> {
        channel.execute(command, self.pty_term(use_pty)).await
    }

    /// Standard output lines of `channel`.
    #[must_use]
    pub fn read_output(&self, channel: &DriverChannel<E, R>) -> DriverOutput<E, R> {
        channel.output(StreamKind::Stdout, Encoding::default())
    }

    /// Standard error lines of `channel`.
    #[must_use]
    pub fn read_stderr(&self, channel: &DriverChannel<E, R>) -> DriverOutput<E, R> {
        channel.output(StreamKind::Stderr, Encoding::default())
    }

    /// Wrap `command` per `options`, execute it and return its output.
    pub async fn run_command(
        &mut self,
        command: &str,
        options: CommandOptions,
    ) -> Result<CommandOutput<E, R>> {
        let composed = compose_command(
            command,
            options.sudo,
            options.user.as_deref(),
            options.shell.as_deref(),
        );
        let channel = self.execute(&composed, options.use_pty).await?;
        let stdout = channel.output(StreamKind::Stdout, options.encoding);
        let stderr = channel.output(StreamKind::Stderr, options.encoding);

        Ok(CommandOutput {
            host: self.config.host.clone(),
            channel,
            stdout,
            stderr,
        })
    }

    /// Close `channel`. Does nothing when no channel is given.
    pub async fn wait_finished(&self, channel: Option<&mut DriverChannel<E, R>>) -> Result<()> {
        match channel {
            Some(channel) => channel.finish().await,
            None => Ok(()),
        }
    }

    /// The SFTP subsystem, started on first use.
    pub async fn sftp(&mut self) -> Result<&mut SftpSession<E::Sftp, R>> {
        if self.sftp.is_none() {
            let inner = self
                .pump
                .drive(|| self.engine.open_sftp())
                .await?
                .map_err(|e| DriverError::channel(&self.config.host, "sftp_init", e))?;
            tracing::debug!(host = %self.config.host, "sftp session started");
            self.sftp = Some(SftpSession::new(inner, self.pump.clone()));
        }
        self.sftp
            .as_mut()
            .ok_or_else(|| DriverError::config("sftp session unavailable"))
    }

    /// Copy a local file, or with `recurse` a directory tree, to `remote`.
    ///
    /// Returns the number of files copied.
    pub async fn copy_file(
        &mut self,
        local: impl AsRef<Path>,
        remote: &str,
        recurse: bool,
    ) -> Result<usize> {
        let chunk_size = self.config.chunk_size;
        let job = PutJob::new(local.as_ref().to_path_buf(), remote.to_string(), recurse);
        transfer::put(self.sftp().await?, job, chunk_size).await
    }

    /// Copy a remote file, or with `recurse` a directory tree, to `local`.
    ///
    /// Returns the number of files copied.
    pub async fn copy_remote_file(
        &mut self,
        remote: &str,
        local: impl Into<PathBuf>,
        recurse: bool,
    ) -> Result<usize> {
        let chunk_size = self.config.chunk_size;
        let job = GetJob::new(remote.to_string(), local.into(), recurse);
        transfer::get(self.sftp().await?, job, chunk_size).await
    }

    /// Create a remote directory and its missing parents.
    pub async fn mkdir(&mut self, path: &str) -> Result<()> {
        self.sftp().await?.mkdir_chain(path, None).await
    }

    /// Send a protocol disconnect and tear the session down.
    pub async fn disconnect(mut self) -> Result<()> {
        self.sftp = None;
        let host = self.config.host.clone();
        let port = self.config.port;
        self.pump
            .drive(|| self.engine.disconnect("Normal Shutdown"))
            .await?
            .map_err(|source| DriverError::Session { host, port, source })?;
        tracing::debug!(host = %self.config.host, "disconnected");
        Ok(())
    }
}

/// Driver over libssh2.
#[cfg(all(unix, feature = "libssh2"))]
pub type SshClient = Driver<crate::engine::libssh2::Libssh2Session, crate::engine::libssh2::SocketReadiness>;

#[cfg(all(unix, feature = "libssh2"))]
impl SshClient {
    /// Connect to `config.host` over TCP and authenticate.
    pub async fn connect(config: DriverConfig) -> Result<Self> {
        let connector = crate::transport::TcpConnector::new();
        Self::connect_with(config, &connector, crate::engine::libssh2::attach).await
    }
}
