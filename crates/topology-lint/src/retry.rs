//! Bounded retry with exponential backoff.
//!
//! Replaces the "poll N times, sleep M seconds" loop with a capped,
//! deadline-aware primitive. A caller deadline always wins over the attempt
//! budget.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Backoff schedule for a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Growth factor between delays.
    pub multiplier: f64,
    /// Cap for a single delay.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Upper bound on the time spent sleeping between attempts.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error.
    Exhausted { attempts: u32, last: E },
    /// The operation failed in a way retrying cannot fix.
    Aborted { attempts: u32, last: E },
    /// The caller deadline passed first.
    DeadlineExceeded { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Aborted { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the operation, if any attempt completed.
    #[must_use]
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last, .. } | Self::Aborted { last, .. } => Some(last),
            Self::DeadlineExceeded { last, .. } => last.as_ref(),
        }
    }
}

/// Run `op` until it succeeds, the attempts run out, or `deadline` passes.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(
    backoff: &Backoff,
    deadline: Option<Instant>,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(backoff, deadline, op, |_| true).await
}

/// Like [`retry`], but stops at the first error `retryable` rejects.
pub async fn retry_if<T, E, F, Fut, P>(
    backoff: &Backoff,
    deadline: Option<Instant>,
    mut op: F,
    retryable: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = backoff.max_attempts.max(1);
    let mut last = None;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, op(attempt)).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(RetryError::DeadlineExceeded { attempts: attempt, last });
                }
            },
            None => op(attempt).await,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !retryable(&err) {
            debug!(attempt, error = %err, "Attempt failed, not retrying");
            return Err(RetryError::Aborted { attempts: attempt, last: err });
        }

        debug!(attempt, max_attempts, error = %err, "Attempt failed");

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted { attempts: attempt, last: err });
        }

        let delay = backoff.delay_for(attempt);
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                return Err(RetryError::DeadlineExceeded {
                    attempts: attempt,
                    last: Some(err),
                });
            }
        }
        last = Some(err);
        tokio::time::sleep(delay).await;
    }
}
