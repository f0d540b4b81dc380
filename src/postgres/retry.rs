//! Bounded exponential backoff
//!
//! Delays grow by `backoff` from `delay`, are capped at `max_delay`, carry
//! up to `max_jitter` of random noise, and never push the total time past
//! `deadline`.

use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;

/// Raised when an operation still fails once the retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailedError {
    pub attempts: u32,
    pub last_error: String,
}

impl fmt::Display for RetryFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exceeded retry deadline after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl std::error::Error for RetryFailedError {}

/// Retry policy.
#[derive(Debug, Clone)]
pub struct Retry {
    pub max_tries: Option<u32>,
    pub delay: Duration,
    pub backoff: u32,
    pub max_jitter: Duration,
    pub max_delay: Duration,
    pub deadline: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_tries: None,
            delay: Duration::from_secs(1),
            backoff: 2,
            max_jitter: Duration::from_millis(800),
            max_delay: Duration::from_secs(3600),
            deadline: Duration::from_secs(10),
        }
    }
}

impl Retry {
    /// Policy bounded by `retry_timeout` seconds.
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            ..Default::default()
        }
    }

    /// Next sleep after `current`, capped at `max_delay`.
    fn next_delay(&self, current: Duration) -> Duration {
        current
            .checked_mul(self.backoff.max(1))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let millis = self.max_jitter.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    /// Call `op` until it succeeds, the attempt limit is hit or the next
    /// sleep would cross the deadline.
    pub fn call<T, E, F>(&self, mut op: F) -> Result<T, RetryFailedError>
    where
        E: fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let started = Instant::now();
        let mut delay = self.delay;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err.to_string(),
            };

            if self.max_tries.map(|max| attempts >= max).unwrap_or(false) {
                return Err(RetryFailedError {
                    attempts,
                    last_error: err,
                });
            }

            let sleep = (delay + self.jitter()).min(self.max_delay);
            if started.elapsed() + sleep > self.deadline {
                return Err(RetryFailedError {
                    attempts,
                    last_error: err,
                });
            }

            debug!(attempt = attempts, delay_ms = sleep.as_millis() as u64, error = %err, "retrying");
            std::thread::sleep(sleep);
            delay = self.next_delay(delay);
        }
    }
}
