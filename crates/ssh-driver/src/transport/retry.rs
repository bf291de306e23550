//! Connect retry strategies.

use std::time::Duration;

/// Default number of connection attempts.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retry strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// A single attempt, no retries.
    None,
    /// Fixed delay between attempts.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
        /// Maximum attempts.
        max_attempts: u32,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY, DEFAULT_RETRIES)
    }
}

impl RetryStrategy {
    /// Create no retry strategy.
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// Create fixed delay strategy.
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self::Fixed {
            delay,
            max_attempts,
        }
    }

    /// Delay to wait after `attempts` failed attempts, or `None` when the
    /// attempt budget is spent.
    #[must_use]
    pub fn delay_after(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.max_attempts() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
        }
    }

    /// Get max attempts. Always at least one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => (*max_attempts).max(1),
        }
    }
}

/// Retry state tracker.
#[derive(Debug)]
pub struct RetryState {
    /// Attempts made so far.
    attempt: u32,
    /// Strategy in use.
    strategy: RetryStrategy,
}

impl RetryState {
    /// Create new state.
    #[must_use]
    pub const fn new(strategy: RetryStrategy) -> Self {
        Self {
            attempt: 0,
            strategy,
        }
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` once attempts are spent.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        self.strategy.delay_after(self.attempt)
    }

    /// Record an attempt.
    pub const fn record_attempt(&mut self) {
        self.attempt += 1;
    }
}
