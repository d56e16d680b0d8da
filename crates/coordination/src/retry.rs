//! Bounded retry with capped exponential backoff and jitter
//!
//! The executor owns retry mechanics; it never decides retryability itself.
//! That decision lives on the error type ([`ratchet_core::Error::class`]),
//! so retry intent is an explicit, testable contract instead of an
//! exception-type guess. Contention errors consume attempts; fatal errors
//! propagate immediately without touching the remaining budget. Exhaustion
//! surfaces the last contention error wrapped as a terminal failure; the
//! executor never silently falls back to success.

use rand::Rng;
use ratchet_core::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior
///
/// # Example
/// ```ignore
/// let policy = RetryPolicy::new()
///     .with_max_attempts(3)
///     .with_base_delay_ms(20);
/// RetryExecutor::new(policy).execute(|attempt| do_work(attempt))?;
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included (0 is rejected at execute time)
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds (doubles per attempt)
    pub base_delay_ms: u64,
    /// Delay ceiling in milliseconds, before jitter
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy that performs a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set total attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set base delay
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set delay ceiling
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Deterministic backoff for a 1-based attempt number, before jitter
    ///
    /// `min(max_delay_ms, base_delay_ms * 2^(attempt-1))`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Cap the shift to prevent overflow
        let shift = attempt.saturating_sub(1).min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Backoff plus uniform jitter in [0, delay/2]
    ///
    /// The jitter spreads out retries across contending processes so they
    /// do not re-collide in lockstep.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        let half = delay.as_millis() as u64 / 2;
        if half == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=half))
    }
}

/// Runs an operation under a retry policy
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy this executor runs with
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails fatally, or the budget is spent
    ///
    /// `op` receives the 1-based attempt number. Retryable errors sleep a
    /// jittered backoff and try again; fatal errors return immediately.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal error, or wraps the last retryable error
    /// in [`Error::RetriesExhausted`] after `max_attempts` attempts.
    pub fn execute<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        if self.policy.max_attempts == 0 {
            return Err(Error::InvalidOperation(
                "retry policy allows zero attempts".to_string(),
            ));
        }

        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    debug!(
                        target: "ratchet::retry",
                        attempt,
                        error = %e,
                        "retryable failure, backing off"
                    );
                    last_error = Some(e);
                    std::thread::sleep(self.policy.jittered_delay(attempt));
                }
                Err(e) if e.is_retryable() => {
                    return Err(Error::RetriesExhausted {
                        attempts: self.policy.max_attempts,
                        last_error: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        // Unreachable: the loop always returns. Defensive fallback.
        Err(last_error.unwrap_or_else(|| {
            Error::InvalidOperation("retry loop exited without a result".to_string())
        }))
    }
}
