//! In-memory protocol engine.
//!
//! A [`MockServer`] holds the remote side: a filesystem, the credentials it
//! accepts, scripted command output and a log of what the driver asked for.
//! The engine objects it hands out all share that state, and every call can
//! be made to report would-block a fixed number of times before completing.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::engine::{
    BlockDirection, ChannelEngine, EngineResult, FileAttributes, FileEngine, RawDirEntry,
    SessionEngine, SftpEngine, Step, StreamEngine, StreamKind, flags,
};
use crate::error::EngineError;
use crate::pump::Readiness;

/// `LIBSSH2_ERROR_AUTHENTICATION_FAILED`.
pub const AUTH_FAILED: i32 = -18;
/// `LIBSSH2_ERROR_AGENT_PROTOCOL`.
pub const AGENT_FAILED: i32 = -42;
/// `LIBSSH2_ERROR_CHANNEL_CLOSED`.
pub const CHANNEL_CLOSED: i32 = -26;
/// `LIBSSH2_FX_NO_SUCH_FILE`.
pub const NO_SUCH_FILE: i32 = 2;
/// `LIBSSH2_FX_FAILURE`.
pub const FAILURE: i32 = 4;

/// One authentication call received by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAttempt {
    /// Key file authentication with this private key.
    PublicKey(PathBuf),
    /// Agent authentication.
    Agent,
    /// Password authentication.
    Password,
}

/// Output and exit status the server produces for the next executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandScript {
    stdout: Vec<Vec<u8>>,
    stderr: Vec<Vec<u8>>,
    exit_status: i32,
}

impl CommandScript {
    /// Empty output, exit status 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stdout chunk.
    #[must_use]
    pub fn stdout(mut self, chunk: impl AsRef<[u8]>) -> Self {
        self.stdout.push(chunk.as_ref().to_vec());
        self
    }

    /// Append a stderr chunk.
    #[must_use]
    pub fn stderr(mut self, chunk: impl AsRef<[u8]>) -> Self {
        self.stderr.push(chunk.as_ref().to_vec());
        self
    }

    /// Set the exit status.
    #[must_use]
    pub const fn exit_status(mut self, status: i32) -> Self {
        self.exit_status = status;
        self
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
    Link(String),
}

/// Link hops followed before a path is treated as missing.
const MAX_LINK_HOPS: usize = 16;

#[derive(Debug, Default)]
struct ChannelRecord {
    command: Option<String>,
    pty: Option<String>,
    stdout: VecDeque<Vec<u8>>,
    stderr: VecDeque<Vec<u8>>,
    exit_status: i32,
    closed: bool,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: BTreeMap<String, Node>,
    would_block_rounds: usize,
    would_blocks: usize,
    waits: usize,
    stalled: bool,
    handshake_error: Option<i32>,
    agent_accepts: bool,
    accepted_keys: HashSet<PathBuf>,
    password: Option<String>,
    authenticated: bool,
    auth_log: Vec<AuthAttempt>,
    mkdir_log: Vec<String>,
    scripts: VecDeque<CommandScript>,
    channels: Vec<ChannelRecord>,
    sftp_inits: usize,
    disconnected: bool,
    timeout: Option<Duration>,
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Normalise a remote path: trailing slashes removed, root kept.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn join_segment(prefix: &str, segment: &str) -> String {
    match prefix {
        "" => segment.to_string(),
        "/" => format!("/{segment}"),
        _ => format!("{prefix}/{segment}"),
    }
}

impl MockState {
    /// Path with every link component replaced by its target.
    fn resolve(&self, path: &str) -> Option<String> {
        let mut current = if path.starts_with('/') {
            "/".to_string()
        } else {
            String::new()
        };
        let mut hops = 0;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = join_segment(&current, segment);
            while let Some(Node::Link(target)) = self.nodes.get(&current) {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return None;
                }
                current = normalize(target);
            }
        }
        Some(current)
    }

    fn is_dir(&self, path: &str) -> bool {
        match self.resolve(path) {
            Some(path) => {
                matches!(path.as_str(), "" | "/" | ".")
                    || matches!(self.nodes.get(&path), Some(Node::Dir))
            }
            None => false,
        }
    }

    fn attributes(&self, path: &str) -> Option<FileAttributes> {
        if self.is_dir(path) {
            return Some(FileAttributes::directory());
        }
        match self.nodes.get(&self.resolve(path)?) {
            Some(Node::File(data)) => Some(FileAttributes::file(data.len() as u64)),
            _ => None,
        }
    }

    /// Attributes of `path` itself, without following a final link.
    fn link_attributes(&self, path: &str) -> FileAttributes {
        match self.nodes.get(path) {
            Some(Node::Link(_)) => FileAttributes::symlink(),
            _ => self.attributes(path).unwrap_or_default(),
        }
    }

    fn children(&self, dir: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|key| key.as_str() != dir && parent_of(key) == dir)
            .map(|key| file_name(key).to_string())
            .collect()
    }
}

/// Counts would-block rounds for one engine object.
#[derive(Debug, Default)]
struct Gate {
    blocked: usize,
}

impl Gate {
    fn pass(&mut self, state: &Shared) -> bool {
        let mut state = lock(state);
        if self.blocked < state.would_block_rounds {
            self.blocked += 1;
            state.would_blocks += 1;
            false
        } else {
            self.blocked = 0;
            true
        }
    }
}

macro_rules! gate {
    ($self:ident) => {
        if !$self.gate.pass(&$self.state) {
            return Ok(Step::WouldBlock);
        }
    };
}

/// The remote side of a mock connection.
///
/// Cloning yields another handle to the same server.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Shared,
}

impl MockServer {
    /// Server with an empty filesystem that accepts nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Make every engine call report would-block `rounds` times first.
    #[must_use]
    pub fn would_block(self, rounds: usize) -> Self {
        self.state().would_block_rounds = rounds;
        self
    }

    /// Accept agent authentication.
    #[must_use]
    pub fn accept_agent(self) -> Self {
        self.state().agent_accepts = true;
        self
    }

    /// Accept key file authentication with `private_key`.
    #[must_use]
    pub fn accept_key(self, private_key: impl Into<PathBuf>) -> Self {
        self.state().accepted_keys.insert(private_key.into());
        self
    }

    /// Accept password authentication with `password`.
    #[must_use]
    pub fn accept_password(self, password: impl Into<String>) -> Self {
        self.state().password = Some(password.into());
        self
    }

    /// Fail the handshake with `code`.
    #[must_use]
    pub fn fail_handshake(self, code: i32) -> Self {
        self.state().handshake_error = Some(code);
        self
    }

    /// Queue the output of the next executed command.
    #[must_use]
    pub fn respond(self, script: CommandScript) -> Self {
        self.state().scripts.push_back(script);
        self
    }

    /// Make readiness waits never complete.
    pub fn stall(&self, stalled: bool) {
        self.state().stalled = stalled;
    }

    /// Create a remote directory (parents are not created).
    #[must_use]
    pub fn with_dir(self, path: &str) -> Self {
        self.state().nodes.insert(normalize(path), Node::Dir);
        self
    }

    /// Create a remote file.
    #[must_use]
    pub fn with_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.state()
            .nodes
            .insert(normalize(path), Node::File(content.as_ref().to_vec()));
        self
    }

    /// Create a remote symbolic link at `path` pointing to `target`.
    #[must_use]
    pub fn with_symlink(self, path: &str, target: &str) -> Self {
        self.state()
            .nodes
            .insert(normalize(path), Node::Link(target.to_string()));
        self
    }

    /// Content of a remote file.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.state().nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Whether `path` is a remote directory.
    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        self.state().is_dir(&normalize(path))
    }

    /// Every remote file path, sorted.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.state()
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Authentication calls received, in order.
    #[must_use]
    pub fn auth_attempts(&self) -> Vec<AuthAttempt> {
        self.state().auth_log.clone()
    }

    /// Directory creation calls received, in order.
    #[must_use]
    pub fn mkdir_calls(&self) -> Vec<String> {
        self.state().mkdir_log.clone()
    }

    /// Commands executed, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .channels
            .iter()
            .filter_map(|c| c.command.clone())
            .collect()
    }

    /// Terminal types requested with a pty, in order.
    #[must_use]
    pub fn pty_requests(&self) -> Vec<String> {
        self.state()
            .channels
            .iter()
            .filter_map(|c| c.pty.clone())
            .collect()
    }

    /// Number of channels opened.
    #[must_use]
    pub fn channels_opened(&self) -> usize {
        self.state().channels.len()
    }

    /// Number of channels closed.
    #[must_use]
    pub fn channels_closed(&self) -> usize {
        self.state().channels.iter().filter(|c| c.closed).count()
    }

    /// Number of SFTP subsystem initialisations.
    #[must_use]
    pub fn sftp_inits(&self) -> usize {
        self.state().sftp_inits
    }

    /// Would-block results handed out.
    #[must_use]
    pub fn would_blocks(&self) -> usize {
        self.state().would_blocks
    }

    /// Readiness waits performed.
    #[must_use]
    pub fn waits(&self) -> usize {
        self.state().waits
    }

    /// Whether the session was authenticated.
    #[must_use]
    pub fn authenticated(&self) -> bool {
        self.state().authenticated
    }

    /// Whether a disconnect was received.
    #[must_use]
    pub fn disconnected(&self) -> bool {
        self.state().disconnected
    }

    /// Timeout pushed to the engine.
    #[must_use]
    pub fn engine_timeout(&self) -> Option<Duration> {
        self.state().timeout
    }

    /// A session engine and readiness source connected to this server.
    #[must_use]
    pub fn connect(&self) -> (MockSession, MockReadiness) {
        (
            MockSession {
                state: Arc::clone(&self.state),
                gate: Gate::default(),
            },
            MockReadiness {
                state: Arc::clone(&self.state),
            },
        )
    }
}

/// Readiness of a mock connection. Always ready unless stalled.
#[derive(Debug)]
pub struct MockReadiness {
    state: Shared,
}

impl Readiness for MockReadiness {
    fn direction(&self) -> BlockDirection {
        BlockDirection::Inbound
    }

    async fn wait(&self, _direction: BlockDirection) -> io::Result<()> {
        let stalled = {
            let mut state = lock(&self.state);
            state.waits += 1;
            state.stalled
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        Ok(())
    }
}

/// Mock session engine.
#[derive(Debug)]
pub struct MockSession {
    state: Shared,
    gate: Gate,
}

impl MockSession {
    fn key_auth(&self, attempt: AuthAttempt, accepted: bool, code: i32) -> EngineResult<()> {
        let mut state = lock(&self.state);
        state.auth_log.push(attempt);
        if accepted {
            state.authenticated = true;
            Ok(Step::Ready(()))
        } else {
            Err(EngineError::session(code, "authentication failed"))
        }
    }
}

impl SessionEngine for MockSession {
    type Channel = MockChannel;
    type Sftp = MockSftp;

    fn handshake(&mut self) -> EngineResult<()> {
        gate!(self);
        match lock(&self.state).handshake_error {
            Some(code) => Err(EngineError::session(code, "handshake failed")),
            None => Ok(Step::Ready(())),
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        lock(&self.state).timeout = timeout;
    }

    fn set_blocking(&mut self, _blocking: bool) {}

    fn auth_public_key_file(
        &mut self,
        _user: &str,
        _public_key: Option<&Path>,
        private_key: &Path,
        _passphrase: Option<&str>,
    ) -> EngineResult<()> {
        gate!(self);
        let accepted = lock(&self.state).accepted_keys.contains(private_key);
        self.key_auth(AuthAttempt::PublicKey(private_key.to_path_buf()), accepted, AUTH_FAILED)
    }

    fn auth_agent(&mut self, _user: &str) -> EngineResult<()> {
        gate!(self);
        let accepted = lock(&self.state).agent_accepts;
        self.key_auth(AuthAttempt::Agent, accepted, AGENT_FAILED)
    }

    fn auth_password(&mut self, _user: &str, password: &str) -> EngineResult<()> {
        gate!(self);
        let accepted = lock(&self.state).password.as_deref() == Some(password);
        self.key_auth(AuthAttempt::Password, accepted, AUTH_FAILED)
    }

    fn open_channel(&mut self) -> EngineResult<MockChannel> {
        gate!(self);
        let mut state = lock(&self.state);
        state.channels.push(ChannelRecord::default());
        Ok(Step::Ready(MockChannel {
            state: Arc::clone(&self.state),
            id: state.channels.len() - 1,
            gate: Gate::default(),
        }))
    }

    fn open_sftp(&mut self) -> EngineResult<MockSftp> {
        gate!(self);
        lock(&self.state).sftp_inits += 1;
        Ok(Step::Ready(MockSftp {
            state: Arc::clone(&self.state),
            gate: Gate::default(),
        }))
    }

    fn disconnect(&mut self, _description: &str) -> EngineResult<()> {
        gate!(self);
        lock(&self.state).disconnected = true;
        Ok(Step::Ready(()))
    }
}

/// Mock channel.
#[derive(Debug)]
pub struct MockChannel {
    state: Shared,
    id: usize,
    gate: Gate,
}

impl MockChannel {
    fn with_record<T>(&self, f: impl FnOnce(&mut ChannelRecord) -> T) -> T {
        f(&mut lock(&self.state).channels[self.id])
    }
}

impl ChannelEngine for MockChannel {
    type Stream = MockChannelStream;

    fn request_pty(&mut self, term: &str) -> EngineResult<()> {
        gate!(self);
        self.with_record(|c| c.pty = Some(term.to_string()));
        Ok(Step::Ready(()))
    }

    fn exec(&mut self, command: &str) -> EngineResult<()> {
        gate!(self);
        let mut state = lock(&self.state);
        let script = state.scripts.pop_front().unwrap_or_default();
        let record = &mut state.channels[self.id];
        if record.closed {
            return Err(EngineError::session(CHANNEL_CLOSED, "channel closed"));
        }
        record.command = Some(command.to_string());
        record.stdout.extend(script.stdout);
        record.stderr.extend(script.stderr);
        record.exit_status = script.exit_status;
        Ok(Step::Ready(()))
    }

    fn stream(&self, kind: StreamKind) -> MockChannelStream {
        MockChannelStream {
            state: Arc::clone(&self.state),
            id: self.id,
            kind,
            gate: Gate::default(),
        }
    }

    fn wait_eof(&mut self) -> EngineResult<()> {
        gate!(self);
        Ok(Step::Ready(()))
    }

    fn close(&mut self) -> EngineResult<()> {
        gate!(self);
        self.with_record(|c| c.closed = true);
        Ok(Step::Ready(()))
    }

    fn wait_closed(&mut self) -> EngineResult<()> {
        gate!(self);
        if self.with_record(|c| c.closed) {
            Ok(Step::Ready(()))
        } else {
            Err(EngineError::session(CHANNEL_CLOSED, "close not requested"))
        }
    }

    fn exit_status(&self) -> Result<i32, EngineError> {
        Ok(self.with_record(|c| c.exit_status))
    }
}

/// One stream of a mock channel.
#[derive(Debug)]
pub struct MockChannelStream {
    state: Shared,
    id: usize,
    kind: StreamKind,
    gate: Gate,
}

impl StreamEngine for MockChannelStream {
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize> {
        gate!(self);
        let mut state = lock(&self.state);
        let record = &mut state.channels[self.id];
        let queue = match self.kind {
            StreamKind::Stdout => &mut record.stdout,
            StreamKind::Stderr => &mut record.stderr,
        };
        let Some(mut chunk) = queue.pop_front() else {
            return Ok(Step::Ready(0));
        };
        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            queue.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(Step::Ready(chunk.len()))
    }
}

/// Mock SFTP subsystem.
#[derive(Debug)]
pub struct MockSftp {
    state: Shared,
    gate: Gate,
}

impl SftpEngine for MockSftp {
    type File = MockFile;

    fn open(&mut self, path: &str, open_flags: u32, _mode: i32) -> EngineResult<MockFile> {
        gate!(self);
        let mut path = normalize(path);
        let mut state = lock(&self.state);

        if open_flags & flags::CREATE != 0 {
            if !state.is_dir(&parent_of(&path)) || state.is_dir(&path) {
                return Err(EngineError::sftp(NO_SUCH_FILE, "no such file"));
            }
            if let Some(parent) = state.resolve(&parent_of(&path)) {
                path = join_segment(&parent, file_name(&path));
            }
            if matches!(state.nodes.get(&path), Some(Node::Link(_))) {
                return Err(EngineError::sftp(NO_SUCH_FILE, "no such file"));
            }
            let truncate = open_flags & flags::TRUNCATE != 0;
            let node = state
                .nodes
                .entry(path.clone())
                .or_insert_with(|| Node::File(Vec::new()));
            if let Node::File(data) = node {
                if truncate {
                    data.clear();
                }
            }
        } else {
            let resolved = state.resolve(&path);
            match resolved {
                Some(resolved) if matches!(state.nodes.get(&resolved), Some(Node::File(_))) => {
                    path = resolved;
                }
                _ => return Err(EngineError::sftp(NO_SUCH_FILE, "no such file")),
            }
        }

        Ok(Step::Ready(MockFile {
            state: Arc::clone(&self.state),
            gate: Gate::default(),
            kind: FileKind::File { path, offset: 0 },
        }))
    }

    fn open_dir(&mut self, path: &str) -> EngineResult<MockFile> {
        gate!(self);
        let path = normalize(path);
        let state = lock(&self.state);
        let Some(resolved) = state.resolve(&path).filter(|p| state.is_dir(p)) else {
            return Err(EngineError::sftp(NO_SUCH_FILE, "not a directory"));
        };
        let mut entries = VecDeque::from([
            (".".to_string(), FileAttributes::directory()),
            ("..".to_string(), FileAttributes::directory()),
        ]);
        entries.extend(state.children(&resolved).into_iter().map(|name| {
            let attrs = state.link_attributes(&join_segment(&resolved, &name));
            (name, attrs)
        }));
        Ok(Step::Ready(MockFile {
            state: Arc::clone(&self.state),
            gate: Gate::default(),
            kind: FileKind::Dir { entries },
        }))
    }

    fn stat(&mut self, path: &str) -> EngineResult<FileAttributes> {
        gate!(self);
        match lock(&self.state).attributes(&normalize(path)) {
            Some(attrs) => Ok(Step::Ready(attrs)),
            None => Err(EngineError::sftp(NO_SUCH_FILE, "no such file")),
        }
    }

    fn mkdir(&mut self, path: &str, _mode: i32) -> EngineResult<()> {
        gate!(self);
        let path = normalize(path);
        let mut state = lock(&self.state);
        state.mkdir_log.push(path.clone());
        if state.attributes(&path).is_some() {
            return Err(EngineError::sftp(FAILURE, "file exists"));
        }
        if !state.is_dir(&parent_of(&path)) {
            return Err(EngineError::sftp(NO_SUCH_FILE, "no such file"));
        }
        state.nodes.insert(path, Node::Dir);
        Ok(Step::Ready(()))
    }
}

#[derive(Debug)]
enum FileKind {
    File { path: String, offset: usize },
    Dir {
        entries: VecDeque<(String, FileAttributes)>,
    },
}

/// Mock file or directory handle.
#[derive(Debug)]
pub struct MockFile {
    state: Shared,
    gate: Gate,
    kind: FileKind,
}

impl FileEngine for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize> {
        gate!(self);
        let FileKind::File { path, offset } = &mut self.kind else {
            return Err(EngineError::sftp(FAILURE, "not a file"));
        };
        let state = lock(&self.state);
        let Some(Node::File(data)) = state.nodes.get(path.as_str()) else {
            return Err(EngineError::sftp(NO_SUCH_FILE, "no such file"));
        };
        let n = buf.len().min(data.len().saturating_sub(*offset));
        buf[..n].copy_from_slice(&data[*offset..*offset + n]);
        *offset += n;
        Ok(Step::Ready(n))
    }

    fn write(&mut self, buf: &[u8]) -> EngineResult<usize> {
        gate!(self);
        let FileKind::File { path, offset } = &mut self.kind else {
            return Err(EngineError::sftp(FAILURE, "not a file"));
        };
        let mut state = lock(&self.state);
        let Some(Node::File(data)) = state.nodes.get_mut(path.as_str()) else {
            return Err(EngineError::sftp(NO_SUCH_FILE, "no such file"));
        };
        data.truncate(*offset);
        data.extend_from_slice(buf);
        *offset += buf.len();
        Ok(Step::Ready(buf.len()))
    }

    fn read_dir(&mut self) -> EngineResult<Option<RawDirEntry>> {
        gate!(self);
        let FileKind::Dir { entries } = &mut self.kind else {
            return Err(EngineError::sftp(FAILURE, "not a directory"));
        };
        Ok(Step::Ready(entries.pop_front().map(|(name, attrs)| RawDirEntry {
            buffer: name.into_bytes(),
            attrs,
        })))
    }

    fn close(&mut self) -> EngineResult<()> {
        gate!(self);
        Ok(Step::Ready(()))
    }
}
