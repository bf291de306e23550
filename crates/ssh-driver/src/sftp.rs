//! SFTP subsystem access.
//!
//! [`SftpSession`] wraps the engine's SFTP subsystem and routes every call
//! through the pump. Remote handles come back as [`SftpHandle`]s, which the
//! transfer code closes on every exit path.

pub mod transfer;

use std::fmt;

pub use transfer::{GetJob, PutJob, TransferJob, get, put};

use crate::engine::{FileAttributes, FileEngine, RawDirEntry, SftpEngine, mode};
use crate::error::{DriverError, EngineError, Result};
use crate::pump::{Pump, Readiness};

/// Split a raw readdir buffer into entry names, dropping `.` and `..`.
#[must_use]
pub fn parse_entry_names(buffer: &[u8]) -> Vec<String> {
    buffer
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .filter(|name| name != "." && name != "..")
        .collect()
}

/// Parent of a remote path: every non-empty segment but the last.
///
/// A leading `/` is kept, so the parent of `/tmp/a/file` is `/tmp/a`. A
/// path with a single segment has an empty parent.
#[must_use]
pub fn remote_parent(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let parent = match segments.split_last() {
        Some((_, parents)) => parents.join("/"),
        None => String::new(),
    };
    if path.starts_with('/') && !parent.is_empty() {
        format!("/{parent}")
    } else {
        parent
    }
}

/// Join a remote directory and an entry name with `/`.
#[must_use]
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

/// The SFTP subsystem of one session.
pub struct SftpSession<S, R> {
    inner: S,
    pump: Pump<R>,
}

impl<S, R> fmt::Debug for SftpSession<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpSession")
            .field("host", &self.pump.host())
            .finish_non_exhaustive()
    }
}

impl<S: SftpEngine, R: Readiness> SftpSession<S, R> {
    /// Wrap an initialised engine subsystem.
    pub const fn new(inner: S, pump: Pump<R>) -> Self {
        Self { inner, pump }
    }

    /// Host of the session.
    #[must_use]
    pub fn host(&self) -> &str {
        self.pump.host()
    }

    fn handle_error(&self, path: &str, err: EngineError) -> DriverError {
        tracing::error!(
            host = %self.pump.host(),
            path = %path,
            code = err.code,
            "error opening file handle"
        );
        DriverError::sftp_handle(self.pump.host(), path, err)
    }

    /// Open a remote file.
    pub async fn open(&mut self, path: &str, flags: u32, mode: i32) -> Result<SftpHandle<S::File, R>> {
        match self.pump.drive(|| self.inner.open(path, flags, mode)).await? {
            Ok(file) => Ok(SftpHandle::new(file, self.pump.clone(), path)),
            Err(err) => Err(self.handle_error(path, err)),
        }
    }

    /// Open a remote directory for listing.
    pub async fn open_dir(&mut self, path: &str) -> Result<SftpHandle<S::File, R>> {
        match self.pump.drive(|| self.inner.open_dir(path)).await? {
            Ok(file) => Ok(SftpHandle::new(file, self.pump.clone(), path)),
            Err(err) => Err(self.handle_error(path, err)),
        }
    }

    /// Status of `path`.
    pub async fn stat(&mut self, path: &str) -> Result<FileAttributes> {
        self.pump
            .drive(|| self.inner.stat(path))
            .await?
            .map_err(|e| DriverError::sftp_handle(self.pump.host(), path, e))
    }

    /// Status of `path`, or `None` when the status call fails.
    pub async fn try_stat(&mut self, path: &str) -> Result<Option<FileAttributes>> {
        Ok(self.pump.drive(|| self.inner.stat(path)).await?.ok())
    }

    /// Create a single remote directory.
    pub async fn mkdir(&mut self, path: &str, mode: i32) -> Result<()> {
        match self.pump.drive(|| self.inner.mkdir(path, mode)).await? {
            Ok(()) => {
                tracing::debug!(host = %self.pump.host(), path = %path, "created remote directory");
                Ok(())
            }
            Err(err) => {
                tracing::error!(host = %self.pump.host(), path = %path, error = %err, "error creating directory");
                Err(DriverError::sftp_engine(
                    self.pump.host(),
                    path,
                    "error creating directory",
                    err,
                ))
            }
        }
    }

    /// Create `path` and every missing ancestor, left to right.
    ///
    /// `parent` is prefixed to `path` when given. Segments that already
    /// exist are checked but not created again.
    pub async fn mkdir_chain(&mut self, path: &str, parent: Option<&str>) -> Result<()> {
        let absolute = parent.is_none() && path.starts_with('/');
        let mut current = parent.map(|p| p.trim_end_matches('/').to_string());

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let full = match &current {
                Some(prefix) => format!("{prefix}/{segment}"),
                None if absolute => format!("/{segment}"),
                None => segment.to_string(),
            };
            if self.try_stat(&full).await?.is_none() {
                self.mkdir(&full, mode::DIRECTORY).await?;
            }
            current = Some(full);
        }
        Ok(())
    }
}

/// An open remote file or directory handle.
///
/// Release it with [`close`](Self::close). A handle dropped while still open
/// logs a warning and is released by the engine handle's own drop, without
/// waiting on the socket and without reporting a close failure.
pub struct SftpHandle<F, R> {
    file: F,
    pump: Pump<R>,
    path: String,
    closed: bool,
}

impl<F, R> fmt::Debug for SftpHandle<F, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpHandle")
            .field("path", &self.path)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<F: FileEngine, R: Readiness> SftpHandle<F, R> {
    fn new(file: F, pump: Pump<R>, path: &str) -> Self {
        Self {
            file,
            pump,
            path: path.to_string(),
            closed: false,
        }
    }

    /// Remote path of the handle.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn io_error(&self, what: &str, err: EngineError) -> DriverError {
        DriverError::sftp_engine(self.pump.host(), &self.path, what, err)
    }

    /// Read into `buf`; `0` at end of file.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.pump.drive(|| self.file.read(&mut *buf)).await? {
            Ok(n) => Ok(n),
            Err(err) => Err(self.io_error("error reading from remote file", err)),
        }
    }

    /// Write all of `data`.
    pub async fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let written = match self.pump.drive(|| self.file.write(data)).await? {
                Ok(0) => {
                    return Err(DriverError::sftp_io(
                        self.pump.host(),
                        &self.path,
                        "error writing to remote file - zero-length write",
                    ));
                }
                Ok(n) => n,
                Err(err) => return Err(self.io_error("error writing to remote file", err)),
            };
            data = &data[written..];
        }
        Ok(())
    }

    /// Next raw directory entry; `None` at end of directory.
    pub async fn read_dir(&mut self) -> Result<Option<RawDirEntry>> {
        match self.pump.drive(|| self.file.read_dir()).await? {
            Ok(entry) => Ok(entry),
            Err(err) => Err(self.io_error("error reading directory", err)),
        }
    }

    /// Every entry of a directory handle with its listing attributes,
    /// without `.` and `..`.
    ///
    /// Listing attributes describe the entry itself, so a symbolic link is
    /// reported as a link rather than as its target.
    pub async fn entries(&mut self) -> Result<Vec<(String, FileAttributes)>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_dir().await? {
            let attrs = entry.attrs;
            entries.extend(
                parse_entry_names(&entry.buffer)
                    .into_iter()
                    .map(|name| (name, attrs)),
            );
        }
        Ok(entries)
    }

    /// Release the handle on the remote side.
    pub async fn close(mut self) -> Result<()> {
        let outcome = self.pump.drive(|| self.file.close()).await?;
        self.closed = true;
        outcome.map_err(|e| self.io_error("error closing handle", e))
    }
}

impl<F, R> Drop for SftpHandle<F, R> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(host = %self.pump.host(), path = %self.path, "remote handle dropped while open");
        }
    }
}
