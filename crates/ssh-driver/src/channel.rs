//! Command execution channels.
//!
//! A [`Channel`] runs one remote command. It is opened and executed through
//! the pump, its streams are read with [`Channel::output`], and it must be
//! closed with [`Channel::finish`] once both streams are drained.

use std::fmt;

use crate::encoding::Encoding;
use crate::engine::{ChannelEngine, SessionEngine, StreamKind};
use crate::error::{DriverError, Result};
use crate::output::HostOutput;
use crate::pump::{Pump, Readiness};

/// Build the command string sent to the server.
///
/// Without sudo, user or shell the command is used verbatim. Otherwise it is
/// wrapped as `[sudo -S |sudo -u <user> -S ]<shell> "<command>"`, with
/// `$SHELL -c` standing in when no shell is given.
#[must_use]
pub fn compose_command(
    command: &str,
    sudo: bool,
    user: Option<&str>,
    shell: Option<&str>,
) -> String {
    let user = user.filter(|u| !u.is_empty());
    let shell = shell.filter(|s| !s.is_empty());

    if !sudo && user.is_none() && shell.is_none() {
        return command.to_string();
    }

    let mut composed = match user {
        Some(user) => format!("sudo -u {user} -S "),
        None if sudo => "sudo -S ".to_string(),
        None => String::new(),
    };
    match shell {
        Some(shell) => composed.push_str(&format!("{shell} \"{command}\"")),
        None => composed.push_str(&format!("$SHELL -c \"{command}\"")),
    }
    composed
}

/// One remote command execution.
pub struct Channel<C, R> {
    inner: C,
    pump: Pump<R>,
    pty: bool,
    closed: bool,
}

impl<C, R> fmt::Debug for Channel<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("host", &self.pump.host())
            .field("pty", &self.pty)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<C: ChannelEngine, R: Readiness> Channel<C, R> {
    /// Wrap an opened engine channel.
    pub const fn new(inner: C, pump: Pump<R>) -> Self {
        Self {
            inner,
            pump,
            pty: false,
            closed: false,
        }
    }

    /// Host the channel runs on.
    #[must_use]
    pub fn host(&self) -> &str {
        self.pump.host()
    }

    /// Whether a pseudo-terminal was requested.
    #[must_use]
    pub const fn pty_requested(&self) -> bool {
        self.pty
    }

    /// Whether [`finish`](Self::finish) completed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Optionally request a pty, then execute `command`.
    ///
    /// Returns as soon as the server accepted the request; it does not wait
    /// for the command to complete.
    pub async fn execute(&mut self, command: &str, pty_term: Option<&str>) -> Result<()> {
        let host = self.pump.host().to_string();

        if let Some(term) = pty_term {
            self.pump
                .drive(|| self.inner.request_pty(term))
                .await?
                .map_err(|e| DriverError::channel(&host, "pty", e))?;
            self.pty = true;
        }

        tracing::debug!(host = %host, command = %command, "executing command");
        self.pump
            .drive(|| self.inner.exec(command))
            .await?
            .map_err(|e| DriverError::channel(&host, "exec", e))
    }

    /// Decoded line sequence of one of the channel's streams.
    #[must_use]
    pub fn output(&self, kind: StreamKind, encoding: Encoding) -> HostOutput<C::Stream, R> {
        HostOutput::new(self.inner.stream(kind), self.pump.clone(), kind, encoding)
    }

    /// Wait for remote EOF, close, and wait for the close acknowledgement.
    ///
    /// Calling it again after it succeeded does nothing.
    pub async fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let host = self.pump.host().to_string();

        self.pump
            .drive(|| self.inner.wait_eof())
            .await?
            .map_err(|e| DriverError::channel(&host, "wait_eof", e))?;
        self.pump
            .drive(|| self.inner.close())
            .await?
            .map_err(|e| DriverError::channel(&host, "close", e))?;
        self.pump
            .drive(|| self.inner.wait_closed())
            .await?
            .map_err(|e| DriverError::channel(&host, "wait_closed", e))?;

        self.closed = true;
        tracing::debug!(host = %host, "channel closed");
        Ok(())
    }

    /// Exit status of the remote command. Meaningful after [`finish`](Self::finish).
    pub fn exit_status(&self) -> Result<i32> {
        self.inner
            .exit_status()
            .map_err(|e| DriverError::channel(self.pump.host(), "exit_status", e))
    }
}

impl<C, R> Drop for Channel<C, R> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(host = %self.pump.host(), "channel dropped without being closed");
        }
    }
}

/// Open a new channel on `engine` and execute `command` on it.
pub async fn open_and_execute<E, R>(
    engine: &mut E,
    pump: &Pump<R>,
    command: &str,
    pty_term: Option<&str>,
) -> Result<Channel<E::Channel, R>>
where
    E: SessionEngine,
    R: Readiness,
{
    tracing::debug!(host = %pump.host(), "opening new channel for execute");
    let inner = pump
        .drive(|| engine.open_channel())
        .await?
        .map_err(|e| DriverError::channel(pump.host(), "open", e))?;

    let mut channel = Channel::new(inner, pump.clone());
    channel.execute(command, pty_term).await?;
    Ok(channel)
}
