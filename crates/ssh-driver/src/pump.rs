//! The operation pump.
//!
//! Every engine call goes through [`Pump::drive`]. The pump invokes the call,
//! and while the engine answers [`Step::WouldBlock`] it suspends the calling
//! task until the session socket is ready in the direction the engine last
//! reported, then invokes the call again. The first definitive outcome is
//! returned unchanged.
//!
//! The wait is the only suspension point of a session. It is bounded by the
//! optional session timeout and can be aborted through a
//! [`CancellationToken`]; aborting a wait leaves the session untouched because
//! the engine call that blocked is simply not retried.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{BlockDirection, EngineResult, Step};
use crate::error::{DriverError, EngineError, Result};
use crate::util::TimeoutExt;

/// Source of socket readiness for a session.
pub trait Readiness: Send + Sync + 'static {
    /// Direction the engine is currently blocked on.
    fn direction(&self) -> BlockDirection;

    /// Wait until the socket is ready for `direction`.
    fn wait(&self, direction: BlockDirection) -> impl Future<Output = io::Result<()>> + Send;
}

/// Retry-until-ready driver for engine calls.
pub struct Pump<R> {
    readiness: Arc<R>,
    host: Arc<str>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl<R> Clone for Pump<R> {
    fn clone(&self) -> Self {
        Self {
            readiness: Arc::clone(&self.readiness),
            host: Arc::clone(&self.host),
            timeout: self.timeout,
            cancel: self.cancel.clone(),
        }
    }
}

impl<R> std::fmt::Debug for Pump<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<R> Pump<R> {
    /// Host this pump drives.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Token that aborts readiness waits.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The readiness source.
    #[must_use]
    pub fn readiness(&self) -> &R {
        &self.readiness
    }
}

impl<R: Readiness> Pump<R> {
    /// Create a pump for a session on `host`.
    pub fn new(readiness: R, host: impl Into<Arc<str>>) -> Self {
        Self {
            readiness: Arc::new(readiness),
            host: host.into(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound every readiness wait by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use `token` to abort readiness waits.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Drive `op` until it produces a definitive outcome.
    ///
    /// The outer `Result` carries failures of the wait itself (timeout,
    /// cancellation, readiness I/O). The inner `Result` is the engine's own
    /// outcome, left for the caller to classify.
    pub async fn drive<T, F>(&self, mut op: F) -> Result<std::result::Result<T, EngineError>>
    where
        F: FnMut() -> EngineResult<T>,
    {
        loop {
            match op() {
                Ok(Step::Ready(value)) => return Ok(Ok(value)),
                Err(err) => return Ok(Err(err)),
                Ok(Step::WouldBlock) => self.wait().await?,
            }
        }
    }

    async fn wait(&self) -> Result<()> {
        let direction = self.readiness.direction();
        tracing::trace!(host = %self.host, ?direction, "waiting on socket readiness");

        let ready = async {
            let waited = match self.timeout {
                Some(duration) => {
                    match self.readiness.wait(direction).with_timeout(duration).await {
                        Ok(waited) => waited,
                        Err(_) => {
                            return Err(DriverError::Timeout {
                                host: self.host.to_string(),
                                duration,
                            });
                        }
                    }
                }
                None => self.readiness.wait(direction).await,
            };
            waited.map_err(DriverError::Io)
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(DriverError::Cancelled {
                host: self.host.to_string(),
            }),
            result = ready => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingReadiness {
        waits: AtomicUsize,
    }

    impl Readiness for CountingReadiness {
        fn direction(&self) -> BlockDirection {
            BlockDirection::Inbound
        }

        async fn wait(&self, _direction: BlockDirection) -> io::Result<()> {
            self.waits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NeverReady;

    impl Readiness for NeverReady {
        fn direction(&self) -> BlockDirection {
            BlockDirection::Both
        }

        async fn wait(&self, _direction: BlockDirection) -> io::Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn retries_until_ready() {
        let pump = Pump::new(CountingReadiness::default(), "host");
        let mut calls = 0;
        let value = pump
            .drive(|| {
                calls += 1;
                if calls < 4 {
                    Ok(Step::WouldBlock)
                } else {
                    Ok(Step::Ready(calls))
                }
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(value, 4);
        assert_eq!(pump.readiness().waits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn engine_errors_pass_through() {
        let pump = Pump::new(CountingReadiness::default(), "host");
        let outcome = pump
            .drive::<(), _>(|| Err(EngineError::session(-18, "denied")))
            .await
            .unwrap();

        assert_eq!(outcome.unwrap_err().code, -18);
        assert_eq!(pump.readiness().waits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_honours_timeout() {
        let pump = Pump::new(NeverReady, "slow.example").with_timeout(Some(Duration::from_secs(2)));
        let err = pump
            .drive::<(), _>(|| Ok(Step::WouldBlock))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn wait_can_be_cancelled() {
        let token = CancellationToken::new();
        let pump = Pump::new(NeverReady, "host").with_cancellation(token.clone());
        token.cancel();

        let err = pump
            .drive::<(), _>(|| Ok(Step::WouldBlock))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Cancelled { .. }));
    }
}
