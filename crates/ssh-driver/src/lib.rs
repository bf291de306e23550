//! ssh-driver: non-blocking single-host SSH driver
//!
//! This crate drives one SSH connection: it connects with bounded retry,
//! authenticates through an ordered credential fallback chain, runs remote
//! commands with line-oriented stdout/stderr, and copies files and directory
//! trees over SFTP in both directions.
//!
//! # Features
//!
//! - **Async-first design** with Tokio runtime
//! - **Operation pump**: every protocol call runs non-blocking and suspends
//!   on socket readiness, with optional timeout and cancellation
//! - **libssh2 engine** via the `ssh2` crate (feature: `libssh2`)
//! - **Mock engine** for testing without a server (feature: `mock`)
//!
//! # Example
//!
//! ```ignore
//! use ssh_driver::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut client = SshClient::connect(DriverConfig::new("web01")).await?;
//!     let mut run = client.run_command("uname -a", CommandOptions::new().sudo()).await?;
//!     while let Some(line) = run.stdout.next_line().await? {
//!         println!("{line}");
//!     }
//!     client.wait_finished(Some(&mut run.channel)).await?;
//!     client.copy_file("./dist", "/srv/app", true).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod channel;
pub mod client;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod output;
pub mod prelude;
pub mod pump;
pub mod sftp;
pub mod transport;
pub mod util;

/// In-memory engine for testing.
#[cfg(feature = "mock")]
pub mod mock;

pub use auth::{AuthMethod, AuthPlan, Credential, authenticate};
pub use channel::{Channel, compose_command, open_and_execute};
#[cfg(all(unix, feature = "libssh2"))]
pub use client::SshClient;
pub use client::{CommandOptions, CommandOutput, Driver, DriverChannel, DriverOutput};
pub use config::DriverConfig;
pub use config::env::EnvConfig;
pub use config::file::ConfigLoader;
pub use encoding::{EncodedText, Encoding, decode_latin1, decode_utf8_escape, decode_utf8_lossy};
pub use engine::{BlockDirection, EngineResult, FileAttributes, RawDirEntry, Step, StreamKind};
pub use error::{DriverError, EngineError, EngineErrorKind, Result};
pub use output::{HostOutput, LineBuffer, OutputReader};
pub use pump::{Pump, Readiness};
pub use sftp::{SftpHandle, SftpSession, TransferJob, parse_entry_names};
pub use transport::{Connector, RetryStrategy, TcpConnector, establish};
pub use util::TimeoutExt;
