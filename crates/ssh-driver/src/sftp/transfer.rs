//! File and directory transfer in both directions.
//!
//! A copy request is a [`TransferJob`]. Directories are expanded into one
//! job per entry on a worklist, each inheriting `recurse = true`, so nested
//! trees are walked without recursion.
//!
//! Symbolic links to directories found while expanding a directory are
//! skipped on both sides, so a link cycle cannot grow the worklist. Links to
//! files are copied as the file they point to.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{SftpHandle, SftpSession, join_remote, remote_parent};
use crate::engine::{FileAttributes, FileEngine, SftpEngine, flags, mode};
use crate::error::{DriverError, Result};
use crate::pump::Readiness;

/// One copy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob<S, D> {
    /// Where data is read from.
    pub source: S,
    /// Where data is written to.
    pub destination: D,
    /// Whether directories are copied recursively.
    pub recurse: bool,
}

/// Local to remote job.
pub type PutJob = TransferJob<PathBuf, String>;

/// Remote to local job.
pub type GetJob = TransferJob<String, PathBuf>;

impl<S, D> TransferJob<S, D> {
    /// Create a job.
    pub const fn new(source: S, destination: D, recurse: bool) -> Self {
        Self {
            source,
            destination,
            recurse,
        }
    }
}

/// Copy `job.source` on the local host to `job.destination` on the remote.
///
/// Returns the number of files copied.
pub async fn put<S, R>(sftp: &mut SftpSession<S, R>, job: PutJob, chunk_size: usize) -> Result<usize>
where
    S: SftpEngine,
    R: Readiness,
{
    let mut pending = VecDeque::from([job]);
    let mut copied = 0;

    while let Some(job) = pending.pop_front() {
        let metadata = tokio::fs::metadata(&job.source).await?;
        if metadata.is_dir() {
            if !job.recurse {
                return Err(DriverError::invalid_argument(format!(
                    "recurse must be true if local file {} is a directory",
                    job.source.display()
                )));
            }
            for name in local_entries(&job.source).await? {
                let source = job.source.join(&name);
                if is_local_dir_link(&source).await? {
                    tracing::warn!(
                        host = %sftp.host(),
                        local = %source.display(),
                        "skipping symbolic link to a directory"
                    );
                    continue;
                }
                pending.push_back(PutJob::new(
                    source,
                    join_remote(&job.destination, &name.to_string_lossy()),
                    true,
                ));
            }
            continue;
        }

        if let Err(err) = put_file(sftp, &job.source, &job.destination, chunk_size).await {
            tracing::error!(
                host = %sftp.host(),
                local = %job.source.display(),
                remote = %job.destination,
                error = %err,
                "error copying file to remote destination"
            );
            return Err(err);
        }
        tracing::info!(
            host = %sftp.host(),
            local = %job.source.display(),
            remote = %job.destination,
            "copied local file to remote destination"
        );
        copied += 1;
    }
    Ok(copied)
}

/// Copy `job.source` on the remote to `job.destination` on the local host.
///
/// Returns the number of files copied.
pub async fn get<S, R>(sftp: &mut SftpSession<S, R>, job: GetJob, chunk_size: usize) -> Result<usize>
where
    S: SftpEngine,
    R: Readiness,
{
    let mut pending = VecDeque::from([job]);
    let mut copied = 0;

    while let Some(job) = pending.pop_front() {
        let Some(attrs) = sftp.try_stat(&job.source).await? else {
            tracing::error!(host = %sftp.host(), remote = %job.source, "remote file or directory does not exist");
            return Err(DriverError::sftp_io(
                sftp.host(),
                &job.source,
                "remote file or directory does not exist",
            ));
        };

        if attrs.is_dir() {
            if !job.recurse {
                return Err(DriverError::invalid_argument(format!(
                    "recurse must be true if remote file {} is a directory",
                    job.source
                )));
            }
            make_local_dir(&job.destination).await?;
            for (name, attrs) in remote_entries(sftp, &job.source).await? {
                let source = join_remote(&job.source, &name);
                if attrs.is_symlink() && sftp.try_stat(&source).await?.is_some_and(|a| a.is_dir()) {
                    tracing::warn!(
                        host = %sftp.host(),
                        remote = %source,
                        "skipping symbolic link to a directory"
                    );
                    continue;
                }
                pending.push_back(GetJob::new(source, job.destination.join(&name), true));
            }
            continue;
        }

        if let Some(parent) = job.destination.parent() {
            make_local_dir(parent).await?;
        }
        if let Err(err) = get_file(sftp, &job.source, &job.destination, chunk_size).await {
            tracing::error!(
                host = %sftp.host(),
                remote = %job.source,
                local = %job.destination.display(),
                error = %err,
                "error copying file from remote destination"
            );
            return Err(err);
        }
        tracing::info!(
            host = %sftp.host(),
            remote = %job.source,
            local = %job.destination.display(),
            "copied remote file to local destination"
        );
        copied += 1;
    }
    Ok(copied)
}

async fn put_file<S, R>(
    sftp: &mut SftpSession<S, R>,
    local: &Path,
    remote: &str,
    chunk_size: usize,
) -> Result<()>
where
    S: SftpEngine,
    R: Readiness,
{
    let parent = remote_parent(remote);
    if !parent.is_empty() && sftp.try_stat(&parent).await?.is_none() {
        sftp.mkdir_chain(&parent, None).await?;
    }

    let mut source = tokio::fs::File::open(local).await?;
    let mut handle = sftp
        .open(
            remote,
            flags::CREATE | flags::WRITE | flags::TRUNCATE,
            mode::FILE,
        )
        .await?;

    let streamed = stream_to_remote(&mut source, &mut handle, chunk_size).await;
    let closed = handle.close().await;
    streamed.and(closed)
}

async fn stream_to_remote<F, R>(
    source: &mut tokio::fs::File,
    handle: &mut SftpHandle<F, R>,
    chunk_size: usize,
) -> Result<()>
where
    F: FileEngine,
    R: Readiness,
{
    let mut buf = vec![0; chunk_size.max(1)];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        handle.write_all(&buf[..n]).await?;
    }
}

async fn get_file<S, R>(
    sftp: &mut SftpSession<S, R>,
    remote: &str,
    local: &Path,
    chunk_size: usize,
) -> Result<()>
where
    S: SftpEngine,
    R: Readiness,
{
    let mut target = tokio::fs::File::create(local).await?;
    let mut handle = sftp.open(remote, flags::READ, 0).await?;

    let streamed = stream_to_local(&mut handle, &mut target, chunk_size).await;
    let closed = handle.close().await;
    streamed.and(closed)?;
    target.flush().await?;
    Ok(())
}

async fn stream_to_local<F, R>(
    handle: &mut SftpHandle<F, R>,
    target: &mut tokio::fs::File,
    chunk_size: usize,
) -> Result<()>
where
    F: FileEngine,
    R: Readiness,
{
    let mut buf = vec![0; chunk_size.max(1)];
    loop {
        let n = handle.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        target.write_all(&buf[..n]).await?;
    }
}

async fn remote_entries<S, R>(
    sftp: &mut SftpSession<S, R>,
    dir: &str,
) -> Result<Vec<(String, FileAttributes)>>
where
    S: SftpEngine,
    R: Readiness,
{
    let mut handle = sftp.open_dir(dir).await?;
    let entries = handle.entries().await;
    let closed = handle.close().await;
    let entries = entries?;
    closed?;
    Ok(entries)
}

/// Entry names of a local directory, sorted.
///
/// Names stay as `OsString`s so the local path is joined from the exact
/// bytes; only the remote name is converted lossily.
async fn local_entries(dir: &Path) -> Result<Vec<OsString>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name());
    }
    names.sort_unstable();
    Ok(names)
}

/// Whether `path` is a symbolic link whose target is a directory.
async fn is_local_dir_link(path: &Path) -> Result<bool> {
    if !tokio::fs::symlink_metadata(path).await?.file_type().is_symlink() {
        return Ok(false);
    }
    Ok(tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()))
}

async fn make_local_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    tokio::fs::create_dir_all(path).await.map_err(|err| {
        tracing::error!(path = %path.display(), error = %err, "unable to create local directory");
        DriverError::Io(err)
    })
}
