//! Response validation against the capabilities a network declared in
//! `/network/options`.
//!
//! The Asserter only checks that required fields are populated and that
//! operations use the types and statuses the network advertised. It does not
//! reconcile balances.

mod block;
mod network;

pub use block::{amount, block_identifier, timestamp};
pub use network::{
    network_identifier, network_list_response, network_options_response, network_status_response,
};

use crate::types::{
    ApiError, BlockIdentifier, NetworkIdentifier, NetworkOptionsResponse, NetworkStatusResponse,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssertError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{field} is negative: {value}")]
    Negative { field: &'static str, value: i64 },
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(String),
    #[error("duplicate network {0}")]
    DuplicateNetwork(String),
    #[error("duplicate operation status {0}")]
    DuplicateOperationStatus(String),
    #[error("duplicate operation type {0}")]
    DuplicateOperationType(String),
    #[error("duplicate error code {0}")]
    DuplicateErrorCode(i32),
    #[error("no operation statuses allowed")]
    NoOperationStatuses,
    #[error("no operation types allowed")]
    NoOperationTypes,
    #[error("operation index {found} out of order, expected {expected}")]
    OperationIndexOutOfOrder { expected: i64, found: i64 },
    #[error("operation {operation} references related operation {related}")]
    InvalidRelatedOperation { operation: i64, related: i64 },
    #[error("unknown operation type {0}")]
    UnknownOperationType(String),
    #[error("unknown operation status {0}")]
    UnknownOperationStatus(String),
    #[error("operation {0} has no status")]
    MissingOperationStatus(i64),
    #[error("invalid amount value {0}")]
    InvalidAmount(String),
    #[error("parent index {parent_index} is not below block index {index}")]
    InvalidParentIndex { index: i64, parent_index: i64 },
    #[error("parent hash equals block hash {0}")]
    ParentHashMatchesBlock(String),
    #[error("timestamp {0} out of range")]
    TimestampOutOfRange(i64),
    #[error("error code {0} not in the network error catalogue")]
    UnknownErrorCode(i32),
    #[error("error code {0} retriable flag differs from the catalogue")]
    ErrorRetriableMismatch(i32),
    #[error("request for {expected} answered by {found}")]
    NetworkMismatch { expected: String, found: String },
    #[error("transaction {hash}: {source}")]
    InTransaction {
        hash: String,
        #[source]
        source: Box<AssertError>,
    },
}

/// Validates network, status and block data for one network.
///
/// Built once during initialization and read-only afterwards; share it as
/// `Arc<Asserter>`.
#[derive(Clone, Debug)]
pub struct Asserter {
    network: NetworkIdentifier,
    genesis_block: BlockIdentifier,
    operation_types: Vec<String>,
    operation_statuses: HashSet<String>,
    /// code -> retriable
    errors: HashMap<i32, bool>,
    historical_balance_lookup: bool,
}

impl Asserter {
    /// Build an Asserter from the network's status and options. Fails if the
    /// options are malformed or self-contradictory.
    pub fn new(
        network: &NetworkIdentifier,
        status: &NetworkStatusResponse,
        options: &NetworkOptionsResponse,
    ) -> Result<Self, AssertError> {
        network_identifier(network)?;
        network_options_response(options)?;
        block_identifier(&status.genesis_block_identifier)?;

        let allow = &options.allow;
        Ok(Self {
            network: network.clone(),
            genesis_block: status.genesis_block_identifier.clone(),
            operation_types: allow.operation_types.clone(),
            operation_statuses: allow
                .operation_statuses
                .iter()
                .map(|s| s.status.clone())
                .collect(),
            errors: allow.errors.iter().map(|e| (e.code, e.retriable)).collect(),
            historical_balance_lookup: allow.historical_balance_lookup,
        })
    }

    pub fn network(&self) -> &NetworkIdentifier {
        &self.network
    }

    pub fn genesis_block(&self) -> &BlockIdentifier {
        &self.genesis_block
    }

    pub fn supports_historical_balance_lookup(&self) -> bool {
        self.historical_balance_lookup
    }

    pub fn operation_types(&self) -> &[String] {
        &self.operation_types
    }

    /// Network status must be well formed; no capability checks apply.
    pub fn network_status(&self, status: &NetworkStatusResponse) -> Result<(), AssertError> {
        network_status_response(status)
    }

    /// Requests must target the network this Asserter was built for.
    pub fn same_network(&self, network: &NetworkIdentifier) -> Result<(), AssertError> {
        if *network != self.network {
            return Err(AssertError::NetworkMismatch {
                expected: self.network.to_string(),
                found: network.to_string(),
            });
        }
        Ok(())
    }

    /// An error returned by the API must come from the declared catalogue and
    /// agree with it on retriability.
    pub fn api_error(&self, err: &ApiError) -> Result<(), AssertError> {
        if err.code < 0 {
            return Err(AssertError::Negative {
                field: "error code",
                value: i64::from(err.code),
            });
        }
        if err.message.is_empty() {
            return Err(AssertError::EmptyField("error message"));
        }
        match self.errors.get(&err.code) {
            None => Err(AssertError::UnknownErrorCode(err.code)),
            Some(&retriable) if retriable != err.retriable => {
                Err(AssertError::ErrorRetriableMismatch(err.code))
            }
            Some(_) => Ok(()),
        }
    }

    fn operation_type_allowed(&self, kind: &str) -> bool {
        self.operation_types.iter().any(|t| t == kind)
    }

    fn operation_status_known(&self, status: &str) -> bool {
        self.operation_statuses.contains(status)
    }
}
