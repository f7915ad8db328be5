//! Shared request throttling.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

/// Grants permission for one outbound request. Shared by every caller of a
/// fetcher; `acquire` may wait but must return `Cancelled` once `cancel` fires.
pub trait RateLimiter: Send + Sync {
    fn acquire<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<(), Cancelled>>;
}

/// Enforces a minimum spacing between request starts.
pub struct IntervalLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Reserve the next free slot; later callers queue behind it.
    fn reserve(&self) -> Instant {
        let mut next = self
            .next_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }

    /// Hand back an unused slot. Only the most recent reservation can be
    /// returned; earlier ones already have callers queued behind them.
    fn release(&self, slot: Instant) {
        let mut next = self
            .next_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *next == Some(slot + self.interval) {
            *next = Some(slot);
        }
    }
}

impl RateLimiter for IntervalLimiter {
    fn acquire<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<(), Cancelled>> {
        async move {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            let slot = self.reserve();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.release(slot);
                    Err(Cancelled)
                }
                _ = tokio::time::sleep_until(slot) => Ok(()),
            }
        }
        .boxed()
    }
}
