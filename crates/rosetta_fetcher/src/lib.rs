//! rosetta_fetcher: resilient client for Rosetta data APIs.
//!
//! Fetches network metadata, blocks and transactions with retries and
//! backoff, assembles blocks whose transactions are reported separately, and
//! asserts every response before returning it. Read-only; no signing.

pub mod asserter;
pub mod fetcher;
pub mod transport;
pub mod types;

pub use asserter::{AssertError, Asserter};
pub use fetcher::{
    ErrorKind, FetchError, Fetcher, FetcherConfig, IntervalLimiter, RateLimiter, RetryPolicy,
};
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{
    Block, BlockIdentifier, BlockMap, NetworkIdentifier, NetworkStatusResponse,
    PartialBlockIdentifier, Transaction, TransactionIdentifier,
};
pub use tokio_util::sync::CancellationToken;
