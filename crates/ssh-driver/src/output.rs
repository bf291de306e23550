//! Line framing of channel output.
//!
//! [`OutputReader`] pulls raw chunks from one channel stream through the
//! pump and frames them into lines with a [`LineBuffer`]. [`HostOutput`]
//! decodes each line, logs it on the host output target and yields it.
//!
//! Lines are separated by `\n` and trimmed of surrounding ASCII whitespace,
//! so `\r\n` endings produced under a pty come out clean. A line whose start
//! and separator arrive in different chunks is reassembled from the buffered
//! remainder. At end of stream a non-empty unterminated tail is yielded as
//! the last line.

use std::collections::VecDeque;
use std::fmt;

use bytes::{Bytes, BytesMut};
use futures::Stream;

pub use crate::engine::StreamKind;
use crate::encoding::Encoding;
use crate::engine::StreamEngine;
use crate::error::{DriverError, Result};
use crate::pump::{Pump, Readiness};

/// Line separator.
pub const LINE_SEPARATOR: u8 = b'\n';

/// Tracing target that receives every decoded host output line.
pub const HOST_OUTPUT_TARGET: &str = "ssh_driver::host_output";

/// Log prefix used for stderr lines.
pub const STDERR_PREFIX: &str = "\t[err]";

/// Size of a single stream read.
const READ_CHUNK_SIZE: usize = 16 * 1024;

fn trim(line: &Bytes) -> Bytes {
    line.slice_ref(line.trim_ascii())
}

/// Accumulates the unterminated tail between chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    remainder: BytesMut,
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, appending every completed line to `lines`.
    pub fn push(&mut self, chunk: &[u8], lines: &mut VecDeque<Bytes>) {
        let mut scan_from = self.remainder.len();
        self.remainder.extend_from_slice(chunk);

        while let Some(offset) = self.remainder[scan_from..]
            .iter()
            .position(|&b| b == LINE_SEPARATOR)
        {
            let mut line = self.remainder.split_to(scan_from + offset + 1).freeze();
            line.truncate(line.len() - 1);
            lines.push_back(trim(&line));
            scan_from = 0;
        }
    }

    /// Take the unterminated tail left at end of stream.
    ///
    /// Returns `None` when the tail is empty after trimming.
    pub fn finish(&mut self) -> Option<Bytes> {
        let tail = trim(&self.remainder.split().freeze());
        (!tail.is_empty()).then_some(tail)
    }

    /// Number of buffered bytes not yet terminated by a separator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.remainder.len()
    }
}

/// Reads one channel stream and frames it into raw lines.
pub struct OutputReader<S, R> {
    stream: S,
    pump: Pump<R>,
    buffer: LineBuffer,
    lines: VecDeque<Bytes>,
    chunk: Vec<u8>,
    eof: bool,
}

impl<S, R> fmt::Debug for OutputReader<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputReader")
            .field("buffered_lines", &self.lines.len())
            .field("pending", &self.buffer.pending())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl<S: StreamEngine, R: Readiness> OutputReader<S, R> {
    /// Create a reader over `stream`.
    pub fn new(stream: S, pump: Pump<R>) -> Self {
        Self {
            stream,
            pump,
            buffer: LineBuffer::new(),
            lines: VecDeque::new(),
            chunk: vec![0; READ_CHUNK_SIZE],
            eof: false,
        }
    }

    /// Read the next raw chunk. `None` once the stream reports end of data.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }
        let read = self
            .pump
            .drive(|| self.stream.read(&mut self.chunk))
            .await?
            .map_err(|e| DriverError::channel(self.pump.host(), "read", e))?;

        if read == 0 {
            self.eof = true;
            return Ok(None);
        }
        tracing::trace!(host = %self.pump.host(), size = read, "got data");
        Ok(Some(Bytes::copy_from_slice(&self.chunk[..read])))
    }

    /// Next trimmed line, undecoded.
    pub async fn next_line(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Ok(Some(line));
            }
            match self.next_chunk().await? {
                Some(chunk) => self.buffer.push(&chunk, &mut self.lines),
                None => return Ok(self.buffer.finish()),
            }
        }
    }
}

type Callback = Box<dyn FnOnce() + Send>;

/// Decoded, logged line sequence of one channel stream.
///
/// The sequence is finite and not restartable.
pub struct HostOutput<S, R> {
    reader: OutputReader<S, R>,
    host: String,
    prefix: &'static str,
    encoding: Encoding,
    on_complete: Option<Callback>,
    exhausted: bool,
}

impl<S, R> fmt::Debug for HostOutput<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostOutput")
            .field("host", &self.host)
            .field("prefix", &self.prefix)
            .field("encoding", &self.encoding)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl<S: StreamEngine, R: Readiness> HostOutput<S, R> {
    /// Wrap `stream` of `kind`.
    pub fn new(stream: S, pump: Pump<R>, kind: StreamKind, encoding: Encoding) -> Self {
        let host = pump.host().to_string();
        let prefix = match kind {
            StreamKind::Stdout => "",
            StreamKind::Stderr => STDERR_PREFIX,
        };
        Self {
            reader: OutputReader::new(stream, pump),
            host,
            prefix,
            encoding,
            on_complete: None,
            exhausted: false,
        }
    }

    /// Run `callback` once, after the last line has been yielded.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Host the output comes from.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Next decoded line, or `None` at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.reader.next_line().await? {
            Some(raw) => {
                let line = self.encoding.decode(&raw);
                tracing::info!(
                    target: HOST_OUTPUT_TARGET,
                    "[{}]{}\t{}",
                    self.host,
                    self.prefix,
                    line
                );
                Ok(Some(line))
            }
            None => {
                self.exhausted = true;
                if let Some(callback) = self.on_complete.take() {
                    callback();
                }
                Ok(None)
            }
        }
    }

    /// Drain every remaining line.
    pub async fn collect(mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Expose the lines as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> {
        futures::stream::try_unfold(self, |mut output| async move {
            let line = output.next_line().await?;
            Ok::<_, DriverError>(line.map(|line| (line, output)))
        })
    }
}
