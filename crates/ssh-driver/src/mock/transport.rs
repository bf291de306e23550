//! Scripted transport for connect retry tests.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use super::engine::{MockReadiness, MockServer, MockSession};
use crate::transport::Connector;

/// A connected mock socket, bound to a server.
#[derive(Debug, Clone)]
pub struct MockSocket {
    server: MockServer,
}

impl MockSocket {
    /// The server this socket reaches.
    #[must_use]
    pub const fn server(&self) -> &MockServer {
        &self.server
    }
}

/// Attach a mock socket to a fresh mock session.
pub fn attach(socket: MockSocket) -> io::Result<(MockSession, MockReadiness)> {
    Ok(socket.server.connect())
}

/// Connector that refuses a fixed number of attempts, then connects.
#[derive(Debug)]
pub struct MockConnector {
    server: MockServer,
    failures: u32,
    attempts: AtomicU32,
}

impl MockConnector {
    /// Connector that reaches `server` on the first attempt.
    #[must_use]
    pub const fn new(server: MockServer) -> Self {
        Self {
            server,
            failures: 0,
            attempts: AtomicU32::new(0),
        }
    }

    /// Refuse the first `failures` attempts.
    #[must_use]
    pub const fn fail_times(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    /// Connect attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Stream = MockSocket;

    async fn connect(&self, host: &str, port: u16) -> io::Result<MockSocket> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{host}:{port} refused attempt {attempt}"),
            ));
        }
        Ok(MockSocket {
            server: self.server.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::DriverError;
    use crate::transport::{RetryStrategy, establish};

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_last_allowed_attempt() {
        let connector = MockConnector::new(MockServer::new()).fail_times(2);
        let strategy = RetryStrategy::fixed(Duration::from_secs(5), 3);

        establish(&connector, "db01", 22, &strategy).await.unwrap();
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let connector = MockConnector::new(MockServer::new()).fail_times(2);
        let strategy = RetryStrategy::fixed(Duration::from_secs(5), 2);

        let err = establish(&connector, "db01", 22, &strategy).await.unwrap_err();
        assert!(matches!(err, DriverError::Connection { attempts: 2, .. }));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_fixed_delay_between_attempts() {
        let connector = MockConnector::new(MockServer::new()).fail_times(2);
        let strategy = RetryStrategy::fixed(Duration::from_secs(5), 3);

        let start = tokio::time::Instant::now();
        establish(&connector, "db01", 22, &strategy).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
