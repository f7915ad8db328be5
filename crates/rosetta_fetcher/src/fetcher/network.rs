use super::error::FetchError;
use super::retry::retry;
use super::Fetcher;
use crate::asserter::{self, Asserter};
use crate::types::{
    Metadata, MetadataRequest, NetworkIdentifier, NetworkListResponse, NetworkOptionsResponse,
    NetworkRequest, NetworkStatusResponse,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Fetcher {
    /// List the networks the server supports.
    pub async fn network_list_retry(
        &self,
        cancel: &CancellationToken,
        metadata: Option<Metadata>,
    ) -> Result<NetworkListResponse, FetchError> {
        let request = MetadataRequest { metadata };
        let list = retry(cancel, &self.config.retry, "network_list", |_| {
            self.throttled(cancel, |t| t.network_list(&request))
        })
        .await?;
        asserter::network_list_response(&list)?;
        debug!(count = list.network_identifiers.len(), "network_list");
        Ok(list)
    }

    pub async fn network_status_retry(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
    ) -> Result<NetworkStatusResponse, FetchError> {
        let request = NetworkRequest::new(network.clone());
        let status = retry(cancel, &self.config.retry, "network_status", |_| {
            self.throttled(cancel, |t| t.network_status(&request))
        })
        .await?;
        asserter::network_status_response(&status)?;
        debug!(
            network = %network,
            current = status.current_block_identifier.index,
            "network_status"
        );
        Ok(status)
    }

    pub async fn network_options_retry(
        &self,
        cancel: &CancellationToken,
        network: &NetworkIdentifier,
    ) -> Result<NetworkOptionsResponse, FetchError> {
        let request = NetworkRequest::new(network.clone());
        let options = retry(cancel, &self.config.retry, "network_options", |_| {
            self.throttled(cancel, |t| t.network_options(&request))
        })
        .await?;
        asserter::network_options_response(&options)?;
        Ok(options)
    }

    /// Pick the primary network, fetch its status and options, and build the
    /// Asserter every later response is checked against.
    ///
    /// Returns the primary network and its (asserted) status.
    pub async fn initialize_asserter(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(NetworkIdentifier, NetworkStatusResponse), FetchError> {
        let list = self.network_list_retry(cancel, None).await?;
        let primary =
            select_primary_network(list.network_identifiers, self.config.primary_network.as_ref())?;

        let status = self.network_status_retry(cancel, &primary).await?;
        let options = self
            .network_options_retry(cancel, &primary)
            .await
            .map_err(|e| match e {
                FetchError::Validation(e) => FetchError::Config(format!("network options: {e}")),
                e => e,
            })?;

        let asserter = Asserter::new(&primary, &status, &options)
            .map_err(|e| FetchError::Config(format!("asserter: {e}")))?;
        asserter.network_status(&status)?;
        info!(
            network = %primary,
            rosetta_version = %options.version.rosetta_version,
            genesis = status.genesis_block_identifier.index,
            current = status.current_block_identifier.index,
            "asserter initialized"
        );
        self.set_asserter(asserter);
        Ok((primary, status))
    }
}

/// The configured network when set (it must be offered), otherwise the first
/// one offered.
fn select_primary_network(
    offered: Vec<NetworkIdentifier>,
    preferred: Option<&NetworkIdentifier>,
) -> Result<NetworkIdentifier, FetchError> {
    if let Some(preferred) = preferred {
        return offered
            .into_iter()
            .find(|n| n == preferred)
            .ok_or_else(|| {
                FetchError::Config(format!("network {preferred} not offered by server"))
            });
    }
    let count = offered.len();
    let first = offered
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Config("server offers no networks".into()))?;
    if count > 1 {
        warn!(count, network = %first, "multiple networks offered; using the first");
    }
    Ok(first)
}
