//! floe-retry
//!
//! Capped exponential backoff with jitter around a fallible async
//! operation.
//!
//! # Contract
//!
//! 1. The k-th wait is `min(initial * multiplier^(k-1), max_interval)`,
//!    perturbed by +/-25% uniform when jitter is enabled.
//! 2. Errors the operation classifies as [`OpError::Permanent`] abort
//!    immediately; only [`OpError::Transient`] is retried.
//! 3. The only suspension point is the sleep between attempts, and
//!    cancellation preempts it.
//! 4. On failure the last cause is preserved together with the attempt
//!    count and the total time spent waiting.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Backoff parameters. All fields are plain data so a policy can be built
/// straight from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Base (un-jittered) wait before retry `k` (1-based: the wait after the
    /// k-th failed attempt).
    pub fn base_wait(&self, k: u32) -> Duration {
        let exp = self.multiplier.powi(k.saturating_sub(1) as i32);
        let raw = self.initial_interval.as_secs_f64() * exp;
        let capped = raw.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Wait before retry `k` with jitter applied if enabled.
    fn next_wait(&self, k: u32) -> Duration {
        let base = self.base_wait(k);
        if !self.jitter {
            return base;
        }
        use rand::Rng;
        let factor: f64 = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}

// ---------------------------------------------------------------------------
// OpError
// ---------------------------------------------------------------------------

/// Classification wrapper the operation returns on failure.
///
/// The operation itself decides what is worth retrying; deadline and
/// connection errors are typically `Transient`, contract violations and
/// backend rejections `Permanent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpError<E> {
    Transient(E),
    Permanent(E),
}

impl<E> OpError<E> {
    pub fn into_cause(self) -> E {
        match self {
            OpError::Transient(e) | OpError::Permanent(e) => e,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryError
// ---------------------------------------------------------------------------

/// Terminal outcome of [`execute`] when the operation never succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// All attempts were consumed; `cause` is the last transient error.
    Exhausted {
        attempts: u32,
        total_wait: Duration,
        cause: E,
    },
    /// The operation returned a permanent error on attempt `attempts`.
    Permanent { attempts: u32, cause: E },
    /// The cancellation token fired before the operation succeeded.
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Permanent { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }

    pub fn cause(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { cause, .. } | RetryError::Permanent { cause, .. } => {
                Some(cause)
            }
            RetryError::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                total_wait,
                cause,
            } => write!(
                f,
                "retries exhausted after {attempts} attempts ({}ms waited): {cause}",
                total_wait.as_millis()
            ),
            RetryError::Permanent { attempts, cause } => {
                write!(f, "permanent error on attempt {attempts}: {cause}")
            }
            RetryError::Cancelled { attempts } => {
                write!(f, "cancelled after {attempts} attempts")
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Run `op` under `policy`, sleeping between attempts.
///
/// The sleep is raced against `cancel`; a token fired mid-wait returns
/// [`RetryError::Cancelled`] without another attempt. A token already fired
/// before the first attempt also short-circuits.
pub async fn execute<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OpError<E>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut total_wait = Duration::ZERO;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled {
                attempts: attempt - 1,
            });
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(OpError::Permanent(cause)) => {
                return Err(RetryError::Permanent {
                    attempts: attempt,
                    cause,
                });
            }
            Err(OpError::Transient(cause)) => {
                if attempt == max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        total_wait,
                        cause,
                    });
                }

                let wait = policy.next_wait(attempt);
                debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after transient error");
                total_wait += wait;

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(RetryError::Cancelled { attempts: attempt });
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }

    unreachable!("loop returns on the final attempt");
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
