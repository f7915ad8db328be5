use super::error::FetchError;
use super::retry::{retry, RetryPolicy};
use super::Fetcher;
use crate::types::{
    Block, BlockIdentifier, BlockRequest, BlockResponse, BlockTransactionRequest,
    NetworkIdentifier, PartialBlockIdentifier, Transaction, TransactionIdentifier,
};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl Fetcher {
    /// Fetch one block, resolve its other transactions and assert the result.
    ///
    /// The block request and each transaction request are retried
    /// independently with the configured policy. The block is returned only
    /// when fully assembled and valid.
    pub async fn fetch_block(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
        block: &PartialBlockIdentifier,
    ) -> Result<Block, FetchError> {
        self.assembled_block(cancel, network, block, &self.config.retry)
            .await
    }

    /// Like `fetch_block` but every request is attempted once.
    pub async fn block(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
        block: &PartialBlockIdentifier,
    ) -> Result<Block, FetchError> {
        self.assembled_block(cancel, network, block, &RetryPolicy::no_retry())
            .await
    }

    /// Resolve transactions of `block` by identifier, in the given order.
    pub async fn block_transactions(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
        block: &BlockIdentifier,
        transactions: &[TransactionIdentifier],
    ) -> Result<Vec<Transaction>, FetchError> {
        self.resolve_transactions(cancel, network, block, transactions, &self.config.retry)
            .await
    }

    async fn assembled_block(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
        partial: &PartialBlockIdentifier,
        policy: &RetryPolicy,
    ) -> Result<Block, FetchError> {
        let asserter = self.asserter()?;
        asserter.same_network(network)?;

        let request = BlockRequest {
            network_identifier: network.clone(),
            block_identifier: partial.clone(),
        };
        let BlockResponse {
            block,
            other_transactions,
        } = retry(cancel, policy, "block", |_| {
            self.throttled(cancel, |t| t.block(&request))
        })
        .await?;

        let mut block = block
            .ok_or_else(|| FetchError::InvalidResponse(format!("no block for {partial:?}")))?;
        check_matches_request(&block.block_identifier, partial)?;

        let others = unseen_transactions(&block, other_transactions.unwrap_or_default());
        if !others.is_empty() {
            debug!(
                index = block.block_identifier.index,
                inline = block.transactions.len(),
                other = others.len(),
                "resolving other transactions"
            );
            let resolved = self
                .resolve_transactions(cancel, network, &block.block_identifier, &others, policy)
                .await?;
            block.transactions.extend(resolved);
        }

        asserter.block(&block)?;
        Ok(block)
    }

    /// Bounded-concurrency lookup; output order follows `ids`, the first
    /// failure drops the requests still in flight.
    async fn resolve_transactions(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
        block: &BlockIdentifier,
        ids: &[TransactionIdentifier],
        policy: &RetryPolicy,
    ) -> Result<Vec<Transaction>, FetchError> {
        futures::stream::iter(ids)
            .map(|id| self.block_transaction(cancel, network, block, id, policy))
            .buffered(self.config.max_transaction_concurrency)
            .try_collect()
            .await
    }

    async fn block_transaction(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
        block: &BlockIdentifier,
        id: &TransactionIdentifier,
        policy: &RetryPolicy,
    ) -> Result<Transaction, FetchError> {
        let request = BlockTransactionRequest {
            network_identifier: network.clone(),
            block_identifier: block.clone(),
            transaction_identifier: id.clone(),
        };
        let response = retry(cancel, policy, "block_transaction", |_| {
            self.throttled(cancel, |t| t.block_transaction(&request))
        })
        .await?;
        if response.transaction.transaction_identifier != *id {
            return Err(FetchError::InvalidResponse(format!(
                "requested transaction {} got {}",
                id.hash, response.transaction.transaction_identifier.hash
            )));
        }
        Ok(response.transaction)
    }
}

fn check_matches_request(
    got: &BlockIdentifier,
    requested: &PartialBlockIdentifier,
) -> Result<(), FetchError> {
    let index_differs = requested.index.is_some_and(|i| i != got.index);
    let hash_differs = requested.hash.as_ref().is_some_and(|h| *h != got.hash);
    if index_differs || hash_differs {
        return Err(FetchError::InvalidResponse(format!(
            "requested {requested:?} got block {} {}",
            got.index, got.hash
        )));
    }
    Ok(())
}

/// Other transaction ids not already inlined, first occurrence kept.
fn unseen_transactions(
    block: &Block,
    others: Vec<TransactionIdentifier>,
) -> Vec<TransactionIdentifier> {
    let mut seen: HashSet<String> = block
        .transactions
        .iter()
        .map(|tx| tx.transaction_identifier.hash.clone())
        .collect();
    others
        .into_iter()
        .filter(|id| {
            let fresh = seen.insert(id.hash.clone());
            if !fresh {
                debug!(hash = %id.hash, "skipping duplicate other transaction");
            }
            fresh
        })
        .collect()
}
