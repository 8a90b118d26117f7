//! Bounded retry with randomized, human-like delays
//!
//! Every page load and "next page" interaction goes through
//! [`with_retries`]. Ordinary failures never escape the combinator: after the
//! last attempt it reports [`RetryOutcome::Exhausted`] and the caller decides
//! whether that means "skip this unit" or "this resource is finished".

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Uniform delay window in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min_ms: u64,
    max_ms: u64,
}

impl DelayRange {
    /// Creates a window; bounds are reordered if given inverted
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// A window that never sleeps
    pub const fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
        }
    }

    /// Draws a delay uniformly from the window
    pub fn sample(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    /// Sleeps for a sampled delay
    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Attempt budget plus the delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: DelayRange,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: DelayRange) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Result of a retried action
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The action succeeded on some attempt
    Success(T),

    /// Every attempt failed
    Exhausted { attempts: u32, last_error: E },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Runs `action` until it succeeds or the policy's attempts are spent
///
/// The action receives the 1-based attempt number. A randomized delay is
/// slept between attempts, never after the last one.
///
/// # Arguments
///
/// * `policy` - Attempt budget and delay window
/// * `label` - Short description used in log lines
/// * `action` - The fallible operation to repeat
pub async fn with_retries<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut action: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match action(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("{} succeeded on attempt {}", label, attempt);
                }
                return RetryOutcome::Success(value);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::warn!("{} failed after {} attempts: {}", label, attempt, e);
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: e,
                };
            }
            Err(e) => {
                tracing::debug!(
                    "{} failed (attempt {}/{}): {}",
                    label,
                    attempt,
                    max_attempts,
                    e
                );
                policy.delay.pause().await;
                attempt += 1;
            }
        }
    }
}
