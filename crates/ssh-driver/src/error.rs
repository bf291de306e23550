//! Error types for ssh-driver.
//!
//! Every failure surfaced to a caller carries the host it happened on and,
//! where the protocol engine was involved, the engine's numeric error code.
//! Would-block outcomes never appear here: the pump absorbs them.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which layer of the protocol engine produced an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Session-level error (transport, auth, channel).
    Session,
    /// SFTP subsystem status code.
    Sftp,
    /// I/O error reported by a stream or file read/write.
    Io,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Sftp => f.write_str("sftp"),
            Self::Io => f.write_str("io"),
        }
    }
}

/// A definitive (non would-block) error returned by the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error {code}: {message}")]
pub struct EngineError {
    /// Layer that reported the error.
    pub kind: EngineErrorKind,
    /// Engine error code.
    pub code: i32,
    /// Human readable message from the engine.
    pub message: String,
}

impl EngineError {
    /// Create a session-level engine error.
    pub fn session(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::Session,
            code,
            message: message.into(),
        }
    }

    /// Create an SFTP status error.
    pub fn sftp(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::Sftp,
            code,
            message: message.into(),
        }
    }

    /// Create an I/O error from a stream or file operation.
    pub fn io(err: &std::io::Error) -> Self {
        Self {
            kind: EngineErrorKind::Io,
            code: err.raw_os_error().unwrap_or(-1),
            message: err.to_string(),
        }
    }
}

/// The main error type for ssh-driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// TCP connect retries were exhausted.
    #[error(
        "error connecting to host '{host}:{port}' - {source} - retry {attempts}/{max_attempts}"
    )]
    Connection {
        /// Host that could not be reached.
        host: String,
        /// Port that was used.
        port: u16,
        /// Attempts made before giving up.
        attempts: u32,
        /// Configured attempt limit.
        max_attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: std::io::Error,
    },

    /// The protocol handshake failed.
    #[error("error connecting to host {host}:{port} - {source}")]
    Session {
        /// Host the handshake was attempted with.
        host: String,
        /// Port the handshake was attempted on.
        port: u16,
        /// Engine error.
        #[source]
        source: EngineError,
    },

    /// Every credential method failed, or an explicitly configured key failed.
    #[error("authentication error while connecting to {host}:{port} as '{user}' - {reason}")]
    Authentication {
        /// Host being authenticated against.
        host: String,
        /// Port of the host.
        port: u16,
        /// User name presented.
        user: String,
        /// Why authentication failed.
        reason: String,
    },

    /// Channel open, execute, read or close failed.
    #[error("channel {operation} failed on host {host} - {source}")]
    Channel {
        /// Host the channel belongs to.
        host: String,
        /// Channel operation that failed.
        operation: &'static str,
        /// Engine error.
        #[source]
        source: EngineError,
    },

    /// A remote file or directory handle could not be opened.
    #[error("error opening file handle for {path} on host {host} - error no: {}", source.code)]
    SftpHandle {
        /// Host the handle was requested on.
        host: String,
        /// Remote path.
        path: String,
        /// Engine error.
        #[source]
        source: EngineError,
    },

    /// Failure during an in-progress remote read or write.
    #[error("SFTP I/O error on {host}:{path} - {reason}")]
    SftpIo {
        /// Host the transfer was running against.
        host: String,
        /// Remote path.
        path: String,
        /// What went wrong.
        reason: String,
        /// Engine error, when the failure came from the engine.
        #[source]
        source: Option<EngineError>,
    },

    /// A directory was passed where `recurse` was required.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A local I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A readiness wait exceeded the session timeout.
    #[error("operation on host {host} timed out after {duration:?}")]
    Timeout {
        /// Host the operation was running against.
        host: String,
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// A readiness wait was cancelled by the caller.
    #[error("operation on host {host} was cancelled")]
    Cancelled {
        /// Host the operation was running against.
        host: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Result type alias for ssh-driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

impl DriverError {
    /// Create an authentication failure.
    pub fn authentication(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Authentication {
            host: host.into(),
            port,
            user: user.into(),
            reason: reason.into(),
        }
    }

    /// Create a channel error.
    pub fn channel(host: impl Into<String>, operation: &'static str, source: EngineError) -> Self {
        Self::Channel {
            host: host.into(),
            operation,
            source,
        }
    }

    /// Create an SFTP handle error.
    pub fn sftp_handle(host: impl Into<String>, path: impl Into<String>, source: EngineError) -> Self {
        Self::SftpHandle {
            host: host.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an SFTP I/O error.
    pub fn sftp_io(
        host: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SftpIo {
            host: host.into(),
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an SFTP I/O error caused by the engine.
    ///
    /// The engine message is appended to `what` and its code is kept.
    pub fn sftp_engine(
        host: impl Into<String>,
        path: impl Into<String>,
        what: &str,
        source: EngineError,
    ) -> Self {
        Self::SftpIo {
            host: host.into(),
            path: path.into(),
            reason: format!("{what} - {source}"),
            source: Some(source),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The engine error code behind this error, if any.
    #[must_use]
    pub const fn engine_code(&self) -> Option<i32> {
        match self {
            Self::Session { source, .. }
            | Self::Channel { source, .. }
            | Self::SftpHandle { source, .. }
            | Self::SftpIo {
                source: Some(source),
                ..
            } => Some(source.code),
            _ => None,
        }
    }

    /// Check if this is an authentication failure.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Check if this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
