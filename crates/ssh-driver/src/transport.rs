//! Transport establishment.
//!
//! Opens the TCP socket a session runs over. Connect failures are retried
//! according to a [`RetryStrategy`]; the caller only ever sees the final
//! [`DriverError::Connection`] once attempts are exhausted.

pub mod retry;

use std::future::Future;
use std::io;

pub use retry::{RetryState, RetryStrategy};

use crate::error::{DriverError, Result};

/// Opens raw byte streams to a host.
pub trait Connector: Send + Sync {
    /// Stream type produced by a successful connect.
    type Stream: Send + 'static;

    /// Make a single connection attempt.
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP connector.
///
/// The returned socket is left in non-blocking mode, ready to be handed to
/// the protocol engine.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    nodelay: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl TcpConnector {
    /// Create a connector with `TCP_NODELAY` enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `TCP_NODELAY` on connected sockets.
    #[must_use]
    pub const fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Connector for TcpConnector {
    type Stream = std::net::TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream> {
        let stream = tokio::net::TcpStream::connect((host, port)).await?;
        stream.set_nodelay(self.nodelay)?;
        stream.into_std()
    }
}

/// Connect to `host:port`, retrying failed attempts per `strategy`.
pub async fn establish<C: Connector>(
    connector: &C,
    host: &str,
    port: u16,
    strategy: &RetryStrategy,
) -> Result<C::Stream> {
    let mut state = RetryState::new(strategy.clone());

    loop {
        state.record_attempt();
        let err = match connector.connect(host, port).await {
            Ok(stream) => {
                tracing::debug!(host = %host, port, attempts = state.attempt(), "connected");
                return Ok(stream);
            }
            Err(err) => err,
        };

        tracing::error!(
            host = %host,
            port,
            error = %err,
            "error connecting to host - retry {}/{}",
            state.attempt(),
            strategy.max_attempts()
        );

        match state.next_delay() {
            Some(delay) => tokio::time::sleep(delay).await,
            None => {
                return Err(DriverError::Connection {
                    host: host.to_string(),
                    port,
                    attempts: state.attempt(),
                    max_attempts: strategy.max_attempts(),
                    source: err,
                });
            }
        }
    }
}
