//! Convenient re-exports for common ssh-driver usage.
//!
//! ```ignore
//! use ssh_driver::prelude::*;
//! ```

// Driver
#[cfg(all(unix, feature = "libssh2"))]
pub use crate::client::SshClient;
pub use crate::client::{CommandOptions, CommandOutput, Driver};

// Configuration
pub use crate::config::DriverConfig;
pub use crate::transport::RetryStrategy;

// Error handling
pub use crate::error::{DriverError, Result};

// Output
pub use crate::encoding::Encoding;
pub use crate::output::HostOutput;

// Cancellation
pub use tokio_util::sync::CancellationToken;
