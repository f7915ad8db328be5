//! Data API fetcher: network initialization, asserted block retrieval with
//! retries, and concurrent range fetch.

mod block;
mod config;
mod error;
mod limiter;
mod network;
mod range;
pub mod retry;

pub use config::FetcherConfig;
pub use error::{ErrorKind, FetchError};
pub use limiter::{Cancelled, IntervalLimiter, RateLimiter};
pub use retry::{retry, RetryError, RetryPolicy, Transient};

use crate::asserter::Asserter;
use crate::transport::{HttpTransport, Transport, TransportError};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Client for one data API endpoint.
///
/// Cheap to share behind an `Arc`; every operation takes `&self` and a
/// cancellation token.
pub struct Fetcher {
    config: FetcherConfig,
    transport: Arc<dyn Transport>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    asserter: RwLock<Option<Arc<Asserter>>>,
    request_count: AtomicU64,
}

impl Fetcher {
    /// Fetcher talking JSON over HTTP to `config.base_url`.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(
            &config.base_url,
            Duration::from_millis(config.request_timeout_ms),
        )
        .map_err(|e| FetchError::Config(format!("transport: {e}")))?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: FetcherConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, FetchError> {
        config.validate()?;
        let rate_limiter = config
            .rate_limit_ms
            .map(|ms| Arc::new(IntervalLimiter::from_millis(ms)) as Arc<dyn RateLimiter>);
        Ok(Self {
            config,
            transport,
            rate_limiter,
            asserter: RwLock::new(None),
            request_count: AtomicU64::new(0),
        })
    }

    /// Replace the limiter built from `rate_limit_ms`.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Use a prepared Asserter instead of calling `initialize_asserter`.
    pub fn with_asserter(self, asserter: Asserter) -> Self {
        self.set_asserter(asserter);
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn asserter(&self) -> Result<Arc<Asserter>, FetchError> {
        self.asserter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(FetchError::AsserterNotInitialized)
    }

    fn set_asserter(&self, asserter: Asserter) {
        *self.asserter.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(asserter));
    }

    /// Transport calls issued so far, retries included.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// One rate-limited transport call. Once an Asserter exists, API errors
    /// must come from the network's declared error catalogue; an undeclared
    /// or inconsistent error is a terminal `Validation` failure.
    async fn throttled<'a, T, F>(
        &'a self,
        cancel: &'a CancellationToken,
        call: F,
    ) -> Result<T, FetchError>
    where
        F: FnOnce(&'a dyn Transport) -> BoxFuture<'a, Result<T, TransportError>>,
    {
        if let Some(limiter) = &self.rate_limiter {
            limiter
                .acquire(cancel)
                .await
                .map_err(|_| FetchError::Cancelled)?;
        }
        self.request_count.fetch_add(1, Ordering::Relaxed);
        match call(self.transport.as_ref()).await {
            Ok(value) => Ok(value),
            Err(TransportError::Api(err)) => {
                if let Ok(asserter) = self.asserter() {
                    asserter.api_error(&err)?;
                }
                Err(TransportError::Api(err).into())
            }
            Err(err) => Err(err.into()),
        }
    }
}
