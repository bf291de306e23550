//! libssh2 engine through the `ssh2` crate.
//!
//! The session runs in non-blocking mode. `LIBSSH2_ERROR_EAGAIN` and
//! `io::ErrorKind::WouldBlock` become [`Step::WouldBlock`]; every other error
//! becomes an [`EngineError`] carrying the libssh2 code.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use ssh2::{BlockDirections, ErrorCode, OpenFlags, OpenType};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::{
    BlockDirection, ChannelEngine, EngineResult, FileAttributes, FileEngine, RawDirEntry,
    SessionEngine, SftpEngine, Step, StreamEngine, StreamKind,
};
use crate::error::EngineError;
use crate::pump::Readiness;

/// `LIBSSH2_ERROR_EAGAIN`.
const ERROR_EAGAIN: i32 = -37;

/// `LIBSSH2_ERROR_FILE`, returned by readdir at end of directory.
const ERROR_FILE: i32 = -16;

fn engine_error(err: &ssh2::Error) -> EngineError {
    match err.code() {
        ErrorCode::Session(code) => EngineError::session(code, err.message()),
        ErrorCode::SFTP(code) => EngineError::sftp(code, err.message()),
    }
}

fn is_eagain(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::Session(ERROR_EAGAIN))
}

fn block_direction(session: &ssh2::Session) -> BlockDirection {
    match session.block_directions() {
        BlockDirections::None => BlockDirection::None,
        BlockDirections::Inbound => BlockDirection::Inbound,
        BlockDirections::Outbound => BlockDirection::Outbound,
        BlockDirections::Both => BlockDirection::Both,
    }
}

/// Translate an `ssh2` call result into an engine step.
fn step<T>(result: Result<T, ssh2::Error>) -> EngineResult<T> {
    match result {
        Ok(value) => Ok(Step::Ready(value)),
        Err(err) if is_eagain(&err) => Ok(Step::WouldBlock),
        Err(err) => Err(engine_error(&err)),
    }
}

/// Translate a std I/O result from a stream or file into an engine step.
fn io_step<T>(result: io::Result<T>) -> EngineResult<T> {
    match result {
        Ok(value) => Ok(Step::Ready(value)),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Step::WouldBlock),
        Err(err) => Err(EngineError::io(&err)),
    }
}

/// Attach a connected socket to a fresh non-blocking libssh2 session.
///
/// Returns the engine and the readiness source the pump waits on. Must be
/// called from within a tokio runtime.
pub fn attach(stream: TcpStream) -> io::Result<(Libssh2Session, SocketReadiness)> {
    stream.set_nonblocking(true)?;
    let watched = stream.try_clone()?;

    let mut session = ssh2::Session::new().map_err(io::Error::from)?;
    session.set_tcp_stream(stream);
    session.set_blocking(false);

    let readiness = SocketReadiness {
        fd: AsyncFd::new(watched)?,
        session: session.clone(),
    };
    Ok((Libssh2Session { session }, readiness))
}

/// Readiness of the session socket, as seen by the tokio reactor.
pub struct SocketReadiness {
    fd: AsyncFd<TcpStream>,
    session: ssh2::Session,
}

impl std::fmt::Debug for SocketReadiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketReadiness").finish_non_exhaustive()
    }
}

impl Readiness for SocketReadiness {
    fn direction(&self) -> BlockDirection {
        block_direction(&self.session)
    }

    async fn wait(&self, direction: BlockDirection) -> io::Result<()> {
        // libssh2 named no direction: the call can be retried right away
        if direction.is_none() {
            tokio::task::yield_now().await;
            return Ok(());
        }
        let interest = match (direction.wants_read(), direction.wants_write()) {
            (true, true) => Interest::READABLE | Interest::WRITABLE,
            (false, true) => Interest::WRITABLE,
            _ => Interest::READABLE,
        };
        let mut guard = self.fd.ready(interest).await?;
        guard.clear_ready();
        Ok(())
    }
}

/// libssh2 session engine.
pub struct Libssh2Session {
    session: ssh2::Session,
}

impl std::fmt::Debug for Libssh2Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libssh2Session")
            .field("authenticated", &self.session.authenticated())
            .finish()
    }
}

impl SessionEngine for Libssh2Session {
    type Channel = Libssh2Channel;
    type Sftp = Libssh2Sftp;

    fn handshake(&mut self) -> EngineResult<()> {
        step(self.session.handshake())
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        let millis = timeout.map_or(0, |t| u32::try_from(t.as_millis()).unwrap_or(u32::MAX));
        self.session.set_timeout(millis);
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.session.set_blocking(blocking);
    }

    fn auth_public_key_file(
        &mut self,
        user: &str,
        public_key: Option<&Path>,
        private_key: &Path,
        passphrase: Option<&str>,
    ) -> EngineResult<()> {
        step(
            self.session
                .userauth_pubkey_file(user, public_key, private_key, passphrase),
        )
    }

    fn auth_agent(&mut self, user: &str) -> EngineResult<()> {
        step(self.session.userauth_agent(user))
    }

    fn auth_password(&mut self, user: &str, password: &str) -> EngineResult<()> {
        step(self.session.userauth_password(user, password))
    }

    fn open_channel(&mut self) -> EngineResult<Libssh2Channel> {
        step(self.session.channel_session()).map(|s| s.map(|channel| Libssh2Channel { channel }))
    }

    fn open_sftp(&mut self) -> EngineResult<Libssh2Sftp> {
        step(self.session.sftp()).map(|s| s.map(|sftp| Libssh2Sftp { sftp }))
    }

    fn disconnect(&mut self, description: &str) -> EngineResult<()> {
        step(self.session.disconnect(None, description, None))
    }
}

/// libssh2 channel.
pub struct Libssh2Channel {
    channel: ssh2::Channel,
}

impl ChannelEngine for Libssh2Channel {
    type Stream = Libssh2Stream;

    fn request_pty(&mut self, term: &str) -> EngineResult<()> {
        step(self.channel.request_pty(term, None, None))
    }

    fn exec(&mut self, command: &str) -> EngineResult<()> {
        step(self.channel.exec(command))
    }

    fn stream(&self, kind: StreamKind) -> Libssh2Stream {
        Libssh2Stream {
            stream: self.channel.stream(kind.id()),
        }
    }

    fn wait_eof(&mut self) -> EngineResult<()> {
        step(self.channel.wait_eof())
    }

    fn close(&mut self) -> EngineResult<()> {
        step(self.channel.close())
    }

    fn wait_closed(&mut self) -> EngineResult<()> {
        step(self.channel.wait_close())
    }

    fn exit_status(&self) -> Result<i32, EngineError> {
        self.channel.exit_status().map_err(|e| engine_error(&e))
    }
}

/// One stream of a libssh2 channel.
pub struct Libssh2Stream {
    stream: ssh2::Stream,
}

impl StreamEngine for Libssh2Stream {
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize> {
        io_step(self.stream.read(buf))
    }
}

/// libssh2 SFTP subsystem.
pub struct Libssh2Sftp {
    sftp: ssh2::Sftp,
}

impl SftpEngine for Libssh2Sftp {
    type File = Libssh2File;

    fn open(&mut self, path: &str, flags: u32, mode: i32) -> EngineResult<Libssh2File> {
        let flags = OpenFlags::from_bits_truncate(flags.into());
        step(
            self.sftp
                .open_mode(Path::new(path), flags, mode, OpenType::File),
        )
        .map(|s| s.map(|file| Libssh2File { file }))
    }

    fn open_dir(&mut self, path: &str) -> EngineResult<Libssh2File> {
        step(self.sftp.opendir(Path::new(path))).map(|s| s.map(|file| Libssh2File { file }))
    }

    fn stat(&mut self, path: &str) -> EngineResult<FileAttributes> {
        step(self.sftp.stat(Path::new(path))).map(|s| {
            s.map(|stat| FileAttributes {
                size: stat.size,
                perm: stat.perm,
            })
        })
    }

    fn mkdir(&mut self, path: &str, mode: i32) -> EngineResult<()> {
        step(self.sftp.mkdir(Path::new(path), mode))
    }
}

/// libssh2 SFTP file or directory handle.
pub struct Libssh2File {
    file: ssh2::File,
}

impl FileEngine for Libssh2File {
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize> {
        io_step(self.file.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> EngineResult<usize> {
        io_step(self.file.write(buf))
    }

    fn read_dir(&mut self) -> EngineResult<Option<RawDirEntry>> {
        match self.file.readdir() {
            Ok((path, stat)) => Ok(Step::Ready(Some(RawDirEntry {
                buffer: path.as_os_str().as_bytes().to_vec(),
                attrs: FileAttributes {
                    size: stat.size,
                    perm: stat.perm,
                },
            }))),
            Err(err) if is_eagain(&err) => Ok(Step::WouldBlock),
            Err(err) if matches!(err.code(), ErrorCode::Session(ERROR_FILE)) => {
                Ok(Step::Ready(None))
            }
            Err(err) => Err(engine_error(&err)),
        }
    }

    fn close(&mut self) -> EngineResult<()> {
        step(self.file.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_without_direction_returns_immediately() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let _peer = listener.accept().unwrap();
        let (_session, readiness) = attach(stream).unwrap();

        assert_eq!(readiness.direction(), BlockDirection::None);
        let waited = tokio::time::timeout(
            Duration::from_secs(2),
            readiness.wait(BlockDirection::None),
        )
        .await;
        assert!(matches!(waited, Ok(Ok(()))));
    }

    #[test]
    fn eagain_is_would_block() {
        let err = ssh2::Error::from_errno(ErrorCode::Session(ERROR_EAGAIN));
        assert!(step::<()>(Err(err)).unwrap().is_would_block());
    }

    #[test]
    fn other_session_errors_keep_their_code() {
        let err = ssh2::Error::from_errno(ErrorCode::Session(-18));
        let engine = step::<()>(Err(err)).unwrap_err();
        assert_eq!(engine.code, -18);
    }

    #[test]
    fn io_would_block_is_would_block() {
        let result: io::Result<usize> = Err(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(io_step(result).unwrap().is_would_block());
    }
}
