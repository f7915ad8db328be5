use super::error::FetchError;
use super::Fetcher;
use crate::types::{BlockMap, NetworkIdentifier, PartialBlockIdentifier};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared state of one range fetch.
struct RangeState {
    low: i64,
    span: u64,
    /// Offset from `low` of the next unclaimed index.
    cursor: AtomicU64,
    blocks: Mutex<BlockMap>,
    failure: Mutex<Option<FetchError>>,
    /// Child of the caller's token; cancelled on the first failure.
    cancel: CancellationToken,
}

impl RangeState {
    fn claim(&self) -> Option<i64> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let offset = self.cursor.fetch_add(1, Ordering::SeqCst);
        if offset >= self.span {
            return None;
        }
        // offset < span <= i64::MAX - low + 1, so this cannot overflow.
        Some(self.low + offset as i64)
    }

    /// Keep the first failure and stop every other worker.
    fn fail(&self, err: FetchError) {
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
        drop(slot);
        self.cancel.cancel();
    }
}

impl Fetcher {
    /// Fetch every block in `[low, high]` with at most `max_concurrency`
    /// requests in flight.
    ///
    /// Returns one entry per index, or the first error any worker hit; a
    /// partially filled map is never returned.
    ///
    /// Workers are futures polled together on the caller's task, so their
    /// requests overlap but block assertion runs on one thread at a time.
    /// They borrow `self` and the shared state, and none can outlive the call.
    /// Callers that need assertion spread across threads can split the range
    /// and spawn one call per part.
    pub async fn fetch_block_range(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
        low: i64,
        high: i64,
    ) -> Result<BlockMap, FetchError> {
        if low < 0 || low > high {
            return Err(FetchError::InvalidRange { low, high });
        }
        let span = (high - low) as u64 + 1;
        let workers = usize::try_from(span)
            .map_or(self.config.max_concurrency, |s| s.min(self.config.max_concurrency));

        let state = RangeState {
            low,
            span,
            cursor: AtomicU64::new(0),
            blocks: Mutex::new(BlockMap::new()),
            failure: Mutex::new(None),
            cancel: cancel.child_token(),
        };
        debug!(low, high, workers, "fetching block range");
        join_all((0..workers).map(|worker| self.range_worker(worker, network, &state))).await;

        let RangeState {
            blocks, failure, ..
        } = state;
        if let Some(err) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let blocks = blocks.into_inner().unwrap_or_else(PoisonError::into_inner);
        if blocks.len() as u64 != span {
            return Err(FetchError::InvalidResponse(format!(
                "range [{low}, {high}] produced {} blocks",
                blocks.len()
            )));
        }
        info!(low, high, count = blocks.len(), "fetched block range");
        Ok(blocks)
    }

    async fn range_worker(&self, worker: usize, network: &NetworkIdentifier, state: &RangeState) {
        while let Some(index) = state.claim() {
            let block = PartialBlockIdentifier::at_index(index);
            match self.fetch_block(&state.cancel, network, &block).await {
                Ok(block) => {
                    state
                        .blocks
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(index, block);
                }
                Err(err) => {
                    if !matches!(err, FetchError::Cancelled) {
                        warn!(worker, index, error = %err, "block fetch failed; stopping range");
                    }
                    state.fail(err);
                    break;
                }
            }
        }
    }
}
