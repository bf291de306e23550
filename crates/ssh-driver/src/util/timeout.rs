//! Timeout utilities.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Timeout, timeout};

/// Extension trait for adding timeouts to futures.
pub trait TimeoutExt: Sized {
    /// Wrap this future with a timeout.
    fn with_timeout(self, duration: Duration) -> Timeout<Self>;

    /// Wrap this future with a timeout in seconds.
    fn with_timeout_secs(self, secs: u64) -> Timeout<Self> {
        self.with_timeout(Duration::from_secs(secs))
    }
}

impl<F: Future> TimeoutExt for F {
    fn with_timeout(self, duration: Duration) -> Timeout<Self> {
        timeout(duration, self)
    }
}
