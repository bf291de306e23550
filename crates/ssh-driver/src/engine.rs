//! The protocol engine seam.
//!
//! The driver never speaks the SSH wire protocol itself. It drives an engine
//! that exposes non-blocking calls: each call either completes
//! ([`Step::Ready`]), fails definitively ([`EngineError`]), or reports that
//! the socket is not ready yet ([`Step::WouldBlock`]). Only the
//! [`Pump`](crate::pump::Pump) is allowed to act on `WouldBlock`.
//!
//! The production engine is libssh2 (feature `libssh2`); the in-memory engine
//! in [`mock`](crate::mock) implements the same traits for tests.

#[cfg(all(unix, feature = "libssh2"))]
pub mod libssh2;

use std::path::Path;
use std::time::Duration;

use crate::error::EngineError;

/// Outcome of a single non-blocking engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Step<T> {
    /// The call completed with a value.
    Ready(T),
    /// The socket was not ready; retry after waiting.
    WouldBlock,
}

impl<T> Step<T> {
    /// Check if this is the would-block sentinel.
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Map the ready value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Self::Ready(v) => Step::Ready(f(v)),
            Self::WouldBlock => Step::WouldBlock,
        }
    }
}

/// Result of an engine call.
pub type EngineResult<T> = std::result::Result<Step<T>, EngineError>;

/// Socket direction the engine was blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockDirection {
    /// The engine did not report a direction.
    #[default]
    None,
    /// Waiting for the socket to become readable.
    Inbound,
    /// Waiting for the socket to become writable.
    Outbound,
    /// Waiting for either direction.
    Both,
}

impl BlockDirection {
    /// Whether readable readiness satisfies this direction.
    #[must_use]
    pub const fn wants_read(self) -> bool {
        matches!(self, Self::Inbound | Self::Both)
    }

    /// Whether the engine named no direction, so the call can be retried
    /// without waiting on the socket.
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether writable readiness satisfies this direction.
    #[must_use]
    pub const fn wants_write(self) -> bool {
        matches!(self, Self::Outbound | Self::Both)
    }
}

/// Which stream of a channel to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard output (stream id 0).
    Stdout,
    /// Standard error (stream id 1).
    Stderr,
}

impl StreamKind {
    /// SSH extended data stream id.
    #[must_use]
    pub const fn id(self) -> i32 {
        match self {
            Self::Stdout => 0,
            Self::Stderr => 1,
        }
    }
}

/// Remote file open flags.
pub mod flags {
    /// Open for reading.
    pub const READ: u32 = 0x0000_0001;
    /// Open for writing.
    pub const WRITE: u32 = 0x0000_0002;
    /// Append to the end of the file.
    pub const APPEND: u32 = 0x0000_0004;
    /// Create the file if it does not exist.
    pub const CREATE: u32 = 0x0000_0008;
    /// Truncate an existing file.
    pub const TRUNCATE: u32 = 0x0000_0010;
    /// Fail if the file exists.
    pub const EXCLUSIVE: u32 = 0x0000_0020;
}

/// Remote permission bits.
pub mod mode {
    /// Owner read.
    pub const S_IRUSR: i32 = 0o400;
    /// Owner write.
    pub const S_IWUSR: i32 = 0o200;
    /// Owner execute.
    pub const S_IXUSR: i32 = 0o100;
    /// Group read.
    pub const S_IRGRP: i32 = 0o040;
    /// Group execute.
    pub const S_IXGRP: i32 = 0o010;
    /// Other read.
    pub const S_IROTH: i32 = 0o004;
    /// Other execute.
    pub const S_IXOTH: i32 = 0o001;

    /// Mode for files written by a transfer (`rw-r--r--`).
    pub const FILE: i32 = S_IRUSR | S_IWUSR | S_IRGRP | S_IROTH;
    /// Mode for directories created by the mkdir chain (`rwxr-xr-x`).
    pub const DIRECTORY: i32 = S_IRUSR | S_IWUSR | S_IXUSR | S_IRGRP | S_IXGRP | S_IROTH | S_IXOTH;
}

/// Remote file attributes returned by a status call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributes {
    /// File size in bytes.
    pub size: Option<u64>,
    /// Permission and type bits.
    pub perm: Option<u32>,
}

impl FileAttributes {
    const S_IFMT: u32 = 0o170_000;
    const S_IFDIR: u32 = 0o040_000;
    const S_IFREG: u32 = 0o100_000;
    const S_IFLNK: u32 = 0o120_000;

    /// Attributes of a directory.
    #[must_use]
    pub const fn directory() -> Self {
        Self {
            size: None,
            perm: Some(Self::S_IFDIR | 0o755),
        }
    }

    /// Attributes of a regular file.
    #[must_use]
    pub const fn file(size: u64) -> Self {
        Self {
            size: Some(size),
            perm: Some(Self::S_IFREG | 0o644),
        }
    }

    /// Attributes of a symbolic link, as reported by a directory listing.
    #[must_use]
    pub const fn symlink() -> Self {
        Self {
            size: None,
            perm: Some(Self::S_IFLNK | 0o777),
        }
    }

    const fn has_type(&self, file_type: u32) -> bool {
        match self.perm {
            Some(perm) => perm & Self::S_IFMT == file_type,
            None => false,
        }
    }

    /// Whether the attributes describe a directory.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.has_type(Self::S_IFDIR)
    }

    /// Whether the attributes describe a symbolic link.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        self.has_type(Self::S_IFLNK)
    }
}

/// One raw entry yielded by a directory read.
///
/// `buffer` holds the entry name bytes as the engine delivered them; use
/// [`parse_entry_names`](crate::sftp::parse_entry_names) to turn it into
/// discrete names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirEntry {
    /// Raw name buffer.
    pub buffer: Vec<u8>,
    /// Entry attributes; a symbolic link is reported as a link.
    pub attrs: FileAttributes,
}

/// Session-level engine operations.
pub trait SessionEngine: Send + 'static {
    /// Channel type produced by [`open_channel`](Self::open_channel).
    type Channel: ChannelEngine;
    /// SFTP subsystem type produced by [`open_sftp`](Self::open_sftp).
    type Sftp: SftpEngine;

    /// Perform the protocol handshake over the attached socket.
    fn handshake(&mut self) -> EngineResult<()>;

    /// Apply a timeout to blocking engine calls.
    fn set_timeout(&mut self, timeout: Option<Duration>);

    /// Switch between blocking and non-blocking mode.
    fn set_blocking(&mut self, blocking: bool);

    /// Authenticate with a private key file and its public counterpart.
    fn auth_public_key_file(
        &mut self,
        user: &str,
        public_key: Option<&Path>,
        private_key: &Path,
        passphrase: Option<&str>,
    ) -> EngineResult<()>;

    /// Authenticate through a running agent.
    fn auth_agent(&mut self, user: &str) -> EngineResult<()>;

    /// Authenticate with a password.
    fn auth_password(&mut self, user: &str, password: &str) -> EngineResult<()>;

    /// Open a session channel.
    fn open_channel(&mut self) -> EngineResult<Self::Channel>;

    /// Start the SFTP subsystem.
    fn open_sftp(&mut self) -> EngineResult<Self::Sftp>;

    /// Send a protocol disconnect.
    fn disconnect(&mut self, description: &str) -> EngineResult<()>;
}

/// Channel engine operations.
pub trait ChannelEngine: Send + 'static {
    /// Read handle type for one of the channel's streams.
    type Stream: StreamEngine;

    /// Request a pseudo-terminal.
    fn request_pty(&mut self, term: &str) -> EngineResult<()>;

    /// Execute a command.
    fn exec(&mut self, command: &str) -> EngineResult<()>;

    /// Obtain a read handle for a stream.
    fn stream(&self, kind: StreamKind) -> Self::Stream;

    /// Wait for the remote end to send EOF.
    fn wait_eof(&mut self) -> EngineResult<()>;

    /// Request channel close.
    fn close(&mut self) -> EngineResult<()>;

    /// Wait for the remote close acknowledgement.
    fn wait_closed(&mut self) -> EngineResult<()>;

    /// Exit status reported by the remote command.
    fn exit_status(&self) -> Result<i32, EngineError>;
}

/// Read side of a channel stream.
pub trait StreamEngine: Send + 'static {
    /// Read raw bytes; `Ready(0)` signals end of stream.
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize>;
}

/// SFTP subsystem operations.
pub trait SftpEngine: Send + 'static {
    /// File or directory handle type.
    type File: FileEngine;

    /// Open a remote file.
    fn open(&mut self, path: &str, flags: u32, mode: i32) -> EngineResult<Self::File>;

    /// Open a remote directory.
    fn open_dir(&mut self, path: &str) -> EngineResult<Self::File>;

    /// Status of a remote path, following symbolic links.
    fn stat(&mut self, path: &str) -> EngineResult<FileAttributes>;

    /// Create a remote directory.
    fn mkdir(&mut self, path: &str, mode: i32) -> EngineResult<()>;
}

/// Operations on an open remote handle.
pub trait FileEngine: Send + 'static {
    /// Read from a file handle; `Ready(0)` signals end of file.
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize>;

    /// Write to a file handle, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> EngineResult<usize>;

    /// Read the next directory entry; `Ready(None)` at end of directory.
    fn read_dir(&mut self) -> EngineResult<Option<RawDirEntry>>;

    /// Release the handle on the remote side.
    fn close(&mut self) -> EngineResult<()>;
}
