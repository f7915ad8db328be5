use super::block::{block_identifier, timestamp};
use super::AssertError;
use crate::types::{
    Allow, ApiError, NetworkIdentifier, NetworkListResponse, NetworkOptionsResponse,
    NetworkStatusResponse, Peer, SyncStatus, Version,
};
use std::collections::HashSet;

pub fn network_identifier(network: &NetworkIdentifier) -> Result<(), AssertError> {
    if network.blockchain.is_empty() {
        return Err(AssertError::EmptyField("network_identifier.blockchain"));
    }
    if network.network.is_empty() {
        return Err(AssertError::EmptyField("network_identifier.network"));
    }
    if let Some(sub) = &network.sub_network_identifier {
        if sub.network.is_empty() {
            return Err(AssertError::EmptyField("sub_network_identifier.network"));
        }
    }
    Ok(())
}

pub fn network_list_response(list: &NetworkListResponse) -> Result<(), AssertError> {
    let mut seen = Vec::with_capacity(list.network_identifiers.len());
    for network in &list.network_identifiers {
        network_identifier(network)?;
        if seen.contains(&network) {
            return Err(AssertError::DuplicateNetwork(network.to_string()));
        }
        seen.push(network);
    }
    Ok(())
}

fn peer(p: &Peer) -> Result<(), AssertError> {
    if p.peer_id.is_empty() {
        return Err(AssertError::EmptyField("peer_id"));
    }
    Ok(())
}

fn sync_status(s: &SyncStatus) -> Result<(), AssertError> {
    for (field, value) in [
        ("sync_status.current_index", s.current_index),
        ("sync_status.target_index", s.target_index),
    ] {
        if let Some(v) = value {
            if v < 0 {
                return Err(AssertError::Negative { field, value: v });
            }
        }
    }
    if let Some(stage) = &s.stage {
        if stage.is_empty() {
            return Err(AssertError::EmptyField("sync_status.stage"));
        }
    }
    Ok(())
}

pub fn network_status_response(status: &NetworkStatusResponse) -> Result<(), AssertError> {
    block_identifier(&status.current_block_identifier)?;
    timestamp(status.current_block_timestamp)?;
    block_identifier(&status.genesis_block_identifier)?;
    if let Some(oldest) = &status.oldest_block_identifier {
        block_identifier(oldest)?;
    }
    if let Some(s) = &status.sync_status {
        sync_status(s)?;
    }
    status.peers.iter().try_for_each(peer)
}

fn version(v: &Version) -> Result<(), AssertError> {
    if v.rosetta_version.is_empty() {
        return Err(AssertError::EmptyField("version.rosetta_version"));
    }
    if v.node_version.is_empty() {
        return Err(AssertError::EmptyField("version.node_version"));
    }
    if let Some(m) = &v.middleware_version {
        if m.is_empty() {
            return Err(AssertError::EmptyField("version.middleware_version"));
        }
    }
    Ok(())
}

fn error_catalogue(errors: &[ApiError]) -> Result<(), AssertError> {
    let mut codes = HashSet::new();
    for err in errors {
        if err.code < 0 {
            return Err(AssertError::Negative {
                field: "error code",
                value: i64::from(err.code),
            });
        }
        if err.message.is_empty() {
            return Err(AssertError::EmptyField("error message"));
        }
        if !codes.insert(err.code) {
            return Err(AssertError::DuplicateErrorCode(err.code));
        }
    }
    Ok(())
}

fn allow(allow: &Allow) -> Result<(), AssertError> {
    if allow.operation_statuses.is_empty() {
        return Err(AssertError::NoOperationStatuses);
    }
    let mut statuses = HashSet::new();
    for s in &allow.operation_statuses {
        if s.status.is_empty() {
            return Err(AssertError::EmptyField("operation status"));
        }
        if !statuses.insert(s.status.as_str()) {
            return Err(AssertError::DuplicateOperationStatus(s.status.clone()));
        }
    }

    if allow.operation_types.is_empty() {
        return Err(AssertError::NoOperationTypes);
    }
    let mut types = HashSet::new();
    for t in &allow.operation_types {
        if t.is_empty() {
            return Err(AssertError::EmptyField("operation type"));
        }
        if !types.insert(t.as_str()) {
            return Err(AssertError::DuplicateOperationType(t.clone()));
        }
    }

    error_catalogue(&allow.errors)
}

pub fn network_options_response(options: &NetworkOptionsResponse) -> Result<(), AssertError> {
    version(&options.version)?;
    allow(&options.allow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asserter::tests::{options, status};
    use crate::types::{BlockIdentifier, SubNetworkIdentifier};

    #[test]
    fn network_identifier_requires_names() {
        assert!(network_identifier(&NetworkIdentifier::new("bitcoin", "mainnet")).is_ok());
        assert_eq!(
            network_identifier(&NetworkIdentifier::new("", "mainnet")),
            Err(AssertError::EmptyField("network_identifier.blockchain"))
        );
        let mut id = NetworkIdentifier::new("bitcoin", "mainnet");
        id.sub_network_identifier = Some(SubNetworkIdentifier {
            network: String::new(),
            metadata: None,
        });
        assert!(network_identifier(&id).is_err());
    }

    #[test]
    fn network_list_rejects_duplicates() {
        let list = NetworkListResponse {
            network_identifiers: vec![
                NetworkIdentifier::new("bitcoin", "mainnet"),
                NetworkIdentifier::new("bitcoin", "mainnet"),
            ],
        };
        assert_eq!(
            network_list_response(&list),
            Err(AssertError::DuplicateNetwork("bitcoin:mainnet".into()))
        );
    }

    #[test]
    fn status_checks() {
        assert!(network_status_response(&status()).is_ok());

        let mut s = status();
        s.current_block_identifier = BlockIdentifier::new(-1, "x");
        assert!(network_status_response(&s).is_err());

        let mut s = status();
        s.peers.push(Peer {
            peer_id: String::new(),
            metadata: None,
        });
        assert_eq!(
            network_status_response(&s),
            Err(AssertError::EmptyField("peer_id"))
        );

        let mut s = status();
        s.sync_status = Some(SyncStatus {
            current_index: Some(-5),
            target_index: None,
            stage: None,
            synced: None,
        });
        assert!(network_status_response(&s).is_err());
    }

    #[test]
    fn options_checks() {
        assert!(network_options_response(&options()).is_ok());

        let mut o = options();
        o.version.node_version.clear();
        assert!(network_options_response(&o).is_err());

        let mut o = options();
        let dup = o.allow.errors[0].clone();
        o.allow.errors.push(dup);
        assert_eq!(
            network_options_response(&o),
            Err(AssertError::DuplicateErrorCode(12))
        );
    }
}
