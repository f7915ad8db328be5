//! Data API transport: one network call per method, no retries.

use crate::types::{
    ApiError, BlockRequest, BlockResponse, BlockTransactionRequest, BlockTransactionResponse,
    MetadataRequest, NetworkListResponse, NetworkOptionsResponse, NetworkRequest,
    NetworkStatusResponse,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    /// The connection failed while the response body was being read.
    #[error("response body: {0}")]
    Body(reqwest::Error),
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("api error: {0}")]
    Api(Box<ApiError>),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("url: {0}")]
    Url(#[from] url::ParseError),
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Request(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            TransportError::Body(_) => true,
            TransportError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            TransportError::Api(err) => err.retriable,
            TransportError::Decode(_) | TransportError::Url(_) => false,
        }
    }
}

/// Calls the data API. Implementations perform exactly one request per call;
/// retrying, rate limiting and cancellation are handled by the fetcher.
pub trait Transport: Send + Sync {
    fn network_list<'a>(
        &'a self,
        request: &'a MetadataRequest,
    ) -> BoxFuture<'a, Result<NetworkListResponse, TransportError>>;

    fn network_status<'a>(
        &'a self,
        request: &'a NetworkRequest,
    ) -> BoxFuture<'a, Result<NetworkStatusResponse, TransportError>>;

    fn network_options<'a>(
        &'a self,
        request: &'a NetworkRequest,
    ) -> BoxFuture<'a, Result<NetworkOptionsResponse, TransportError>>;

    fn block<'a>(
        &'a self,
        request: &'a BlockRequest,
    ) -> BoxFuture<'a, Result<BlockResponse, TransportError>>;

    fn block_transaction<'a>(
        &'a self,
        request: &'a BlockTransactionRequest,
    ) -> BoxFuture<'a, Result<BlockTransactionResponse, TransportError>>;
}

/// JSON-over-HTTP transport against a Rosetta server.
pub struct HttpTransport {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        // Url::join drops the last path segment unless it ends with '/'.
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        debug!(%url, "post");
        let res = self.client.post(url).json(request).send().await?;
        let status = res.status();
        let body = res.text().await.map_err(TransportError::Body)?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiError>(&body) {
                Ok(api) => TransportError::Api(Box::new(api)),
                Err(_) => TransportError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl Transport for HttpTransport {
    fn network_list<'a>(
        &'a self,
        request: &'a MetadataRequest,
    ) -> BoxFuture<'a, Result<NetworkListResponse, TransportError>> {
        self.post("network/list", request).boxed()
    }

    fn network_status<'a>(
        &'a self,
        request: &'a NetworkRequest,
    ) -> BoxFuture<'a, Result<NetworkStatusResponse, TransportError>> {
        self.post("network/status", request).boxed()
    }

    fn network_options<'a>(
        &'a self,
        request: &'a NetworkRequest,
    ) -> BoxFuture<'a, Result<NetworkOptionsResponse, TransportError>> {
        self.post("network/options", request).boxed()
    }

    fn block<'a>(
        &'a self,
        request: &'a BlockRequest,
    ) -> BoxFuture<'a, Result<BlockResponse, TransportError>> {
        self.post("block", request).boxed()
    }

    fn block_transaction<'a>(
        &'a self,
        request: &'a BlockTransactionRequest,
    ) -> BoxFuture<'a, Result<BlockTransactionResponse, TransportError>> {
        self.post("block/transaction", request).boxed()
    }
}
