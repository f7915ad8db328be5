//! Fetcher configuration.
//!
//! Load from: env `ROSETTA_FETCHER_CONFIG`, or `./config/fetcher.json`.
//! Missing fields take their defaults.

use super::error::FetchError;
use super::retry::RetryPolicy;
use crate::types::NetworkIdentifier;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
const REQUEST_TIMEOUT_MS: u64 = 30_000;
const MAX_CONCURRENCY: usize = 8;
const MAX_TRANSACTION_CONCURRENCY: usize = 4;
const CONFIG_PATH_ENV: &str = "ROSETTA_FETCHER_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Blocks fetched at once by a range fetch.
    pub max_concurrency: usize,
    /// Other transactions resolved at once within one block.
    pub max_transaction_concurrency: usize,
    /// Minimum spacing between request starts; None disables throttling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_ms: Option<u64>,
    /// Network to use when the server offers several; None picks the first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_network: Option<NetworkIdentifier>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            retry: RetryPolicy::default(),
            max_concurrency: MAX_CONCURRENCY,
            max_transaction_concurrency: MAX_TRANSACTION_CONCURRENCY,
            rate_limit_ms: None,
            primary_network: None,
        }
    }
}

impl FetcherConfig {
    /// Load config from a JSON file.
    pub fn load_from_path(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Config(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| FetchError::Config(format!("parse {}: {}", path.display(), e)))
    }

    /// Load config: env ROSETTA_FETCHER_CONFIG, then ./config/fetcher.json,
    /// then defaults.
    pub fn load() -> Result<Self, FetchError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from_path(Path::new(&path));
        }
        let candidate = Path::new("./config/fetcher.json");
        if candidate.exists() {
            return Self::load_from_path(candidate);
        }
        Ok(Self::default())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), FetchError> {
        if self.max_concurrency == 0 {
            return Err(FetchError::Config("max_concurrency must be positive".into()));
        }
        if self.max_transaction_concurrency == 0 {
            return Err(FetchError::Config(
                "max_transaction_concurrency must be positive".into(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(FetchError::Config("retry.multiplier must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(FetchError::Config("retry.jitter_ratio must be in [0, 1]".into()));
        }
        Ok(())
    }
}
