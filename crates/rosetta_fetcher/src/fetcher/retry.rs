//! Retry with exponential backoff, jitter and cancellation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 10;
const MAX_ELAPSED_MS: u64 = 60_000;
const BASE_DELAY_MS: u64 = 500;
const MULTIPLIER: f64 = 1.5;
const MAX_DELAY_MS: u64 = 10_000;
const JITTER_RATIO: f64 = 0.5;

/// Errors that can tell whether another attempt may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Budget and backoff schedule for one logical operation.
///
/// Whichever of `max_attempts` and `max_elapsed_ms` binds first ends the
/// retries; `None` disables that limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub max_elapsed_ms: Option<u64>,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Delay is drawn uniformly from `delay * (1 ± jitter_ratio)`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(MAX_ATTEMPTS),
            max_elapsed_ms: Some(MAX_ELAPSED_MS),
            base_delay_ms: BASE_DELAY_MS,
            multiplier: MULTIPLIER,
            max_delay_ms: MAX_DELAY_MS,
            jitter_ratio: JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(1),
            ..Default::default()
        }
    }

    /// `min(cap, base * multiplier^retry)` before jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let cap = self.max_delay_ms as f64;
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exp);
        let ms = if raw.is_finite() { raw.clamp(0.0, cap) } else { cap };
        Duration::from_millis(ms as u64)
    }

    fn jittered_backoff(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 || delay.is_zero() {
            return delay;
        }
        let ms = delay.as_millis() as f64;
        let spread = ms * ratio;
        let jittered = rand::thread_rng().gen_range((ms - spread)..=(ms + spread));
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    fn attempts_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max.max(1))
    }

    fn elapsed_exhausted(&self, elapsed: Duration, next_delay: Duration) -> bool {
        self.max_elapsed_ms
            .is_some_and(|max| elapsed + next_delay > Duration::from_millis(max))
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Failure that another attempt cannot fix.
    Terminal(E),
    /// Budget spent; `last` is the final transient failure.
    Exhausted { attempts: u32, last: E },
    Cancelled,
}

/// Run `attempt` until it succeeds, fails terminally, the policy's budget is
/// spent, or `cancel` fires. `attempt` receives the 1-based attempt number.
///
/// Both the attempt itself and the backoff sleep are raced against `cancel`,
/// so cancellation returns without waiting for either to finish.
pub async fn retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    label: &str,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            r = attempt(attempts) => r,
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => {
                debug!(label, attempt = attempts, error = %err, "terminal failure");
                return Err(RetryError::Terminal(err));
            }
            Err(err) => err,
        };

        let delay = policy.jittered_backoff(attempts - 1);
        if policy.attempts_exhausted(attempts) || policy.elapsed_exhausted(start.elapsed(), delay)
        {
            warn!(label, attempts, error = %err, "retries exhausted");
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        }

        warn!(
            label,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retry after error"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
