//! Bounded retry policy for ranking backend calls.
//!
//! The policy owns the attempt limit, the backoff curve and the
//! retryable-error predicate; [`RetryPolicy::run`] is the only loop that
//! sleeps. Transport code never retries on its own.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::RankError;

/// Decides whether a failed call may be attempted again.
pub type RetryPredicate = fn(&RankError) -> bool;

/// Explicit retry policy: attempts, doubling backoff, retryable predicate.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later one.
    pub base_delay: Duration,
    pub retryable: RetryPredicate,
    /// Injected so tests do not sleep.
    pub sleeper: fn(Duration),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            retryable: is_retryable,
            sleeper: std::thread::sleep,
        }
    }
}

/// Rate limits (429), server errors (5xx) and transport failures are retried.
/// Authentication failures and malformed replies are not.
pub const fn is_retryable(err: &RankError) -> bool {
    match err {
        RankError::Status { status, .. } => *status == 429 || (*status >= 500 && *status <= 599),
        RankError::Transport(_) => true,
        RankError::Malformed(_) => false,
    }
}

impl RetryPolicy {
    /// A policy that never sleeps.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            sleeper: |_| {},
            ..Self::default()
        }
    }

    /// Backoff before attempt number `attempt` (1-based; attempt 1 has none).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Drive `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T>(&self, mut op: impl FnMut(u32) -> Result<T, RankError>) -> Result<T, RankError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !(self.retryable)(&err) => {
                    debug!(attempt, error = %err, "non-retryable ranking failure");
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    warn!(attempt, error = %err, "ranking retries exhausted");
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    debug!(attempt, delay_ms = delay.as_millis(), error = %err, "retrying ranking call");
                    (self.sleeper)(delay);
                }
            }
        }
    }
}
