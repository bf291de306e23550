//! In-memory engine and transport for testing.
//!
//! A [`MockServer`] stands in for the remote host. It hands out engine
//! objects implementing the same traits as the libssh2 engine, so a
//! [`Driver`](crate::Driver) can be exercised end to end without a network.
//!
//! # Example
//!
//! ```rust
//! use ssh_driver::mock::{CommandScript, MockServer};
//!
//! let server = MockServer::new()
//!     .would_block(2)
//!     .accept_password("secret")
//!     .respond(CommandScript::new().stdout("hello\n").exit_status(0));
//!
//! let (engine, readiness) = server.connect();
//! ```

pub mod engine;
pub mod transport;

pub use engine::{
    AuthAttempt, CommandScript, MockChannel, MockChannelStream, MockFile, MockReadiness,
    MockServer, MockSession, MockSftp,
};
pub use transport::{MockConnector, MockSocket, attach};

use crate::client::Driver;
use crate::config::DriverConfig;
use crate::error::Result;

/// Driver over the mock engine.
pub type MockDriver = Driver<MockSession, MockReadiness>;

/// Connect a driver to `server` with `config`.
pub async fn driver(server: &MockServer, config: DriverConfig) -> Result<MockDriver> {
    let (engine, readiness) = server.connect();
    Driver::from_engine(config, engine, readiness).await
}
