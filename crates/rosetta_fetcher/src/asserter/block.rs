use super::{AssertError, Asserter};
use crate::types::{AccountIdentifier, Amount, Block, BlockIdentifier, Operation, Transaction};
use std::collections::HashSet;
use time::macros::datetime;

/// 2000-01-01T00:00:00Z in milliseconds.
const MIN_TIMESTAMP_MS: i64 = datetime!(2000-01-01 0:00 UTC).unix_timestamp() * 1000;
/// 2040-01-01T00:00:00Z in milliseconds.
const MAX_TIMESTAMP_MS: i64 = datetime!(2040-01-01 0:00 UTC).unix_timestamp() * 1000;

pub fn block_identifier(id: &BlockIdentifier) -> Result<(), AssertError> {
    if id.hash.is_empty() {
        return Err(AssertError::EmptyField("block_identifier.hash"));
    }
    if id.index < 0 {
        return Err(AssertError::Negative {
            field: "block_identifier.index",
            value: id.index,
        });
    }
    Ok(())
}

/// Millisecond timestamp within [2000-01-01, 2040-01-01].
pub fn timestamp(ms: i64) -> Result<(), AssertError> {
    if !(MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS).contains(&ms) {
        return Err(AssertError::TimestampOutOfRange(ms));
    }
    Ok(())
}

/// Integer string with optional leading minus and at least one digit.
pub fn amount(amount: &Amount) -> Result<(), AssertError> {
    let digits = amount
        .value
        .strip_prefix('-')
        .unwrap_or(amount.value.as_str());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AssertError::InvalidAmount(amount.value.clone()));
    }
    if amount.currency.symbol.is_empty() {
        return Err(AssertError::EmptyField("currency.symbol"));
    }
    if amount.currency.decimals < 0 {
        return Err(AssertError::Negative {
            field: "currency.decimals",
            value: i64::from(amount.currency.decimals),
        });
    }
    Ok(())
}

fn account_identifier(account: &AccountIdentifier) -> Result<(), AssertError> {
    if account.address.is_empty() {
        return Err(AssertError::EmptyField("account.address"));
    }
    if let Some(sub) = &account.sub_account {
        if sub.address.is_empty() {
            return Err(AssertError::EmptyField("sub_account.address"));
        }
    }
    Ok(())
}

impl Asserter {
    /// Validate a fully assembled block.
    pub fn block(&self, block: &Block) -> Result<(), AssertError> {
        block_identifier(&block.block_identifier)?;
        block_identifier(&block.parent_block_identifier)?;

        // Genesis may name itself as parent and carry any timestamp.
        if block.block_identifier.index != self.genesis_block().index {
            if block.parent_block_identifier.index >= block.block_identifier.index {
                return Err(AssertError::InvalidParentIndex {
                    index: block.block_identifier.index,
                    parent_index: block.parent_block_identifier.index,
                });
            }
            if block.parent_block_identifier.hash == block.block_identifier.hash {
                return Err(AssertError::ParentHashMatchesBlock(
                    block.block_identifier.hash.clone(),
                ));
            }
            timestamp(block.timestamp)?;
        }

        let mut seen = HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if !seen.insert(tx.transaction_identifier.hash.as_str()) {
                return Err(AssertError::DuplicateTransaction(
                    tx.transaction_identifier.hash.clone(),
                ));
            }
            self.transaction(tx)
                .map_err(|source| AssertError::InTransaction {
                    hash: tx.transaction_identifier.hash.clone(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    pub fn transaction(&self, tx: &Transaction) -> Result<(), AssertError> {
        if tx.transaction_identifier.hash.is_empty() {
            return Err(AssertError::EmptyField("transaction_identifier.hash"));
        }
        for (position, op) in tx.operations.iter().enumerate() {
            let expected = i64::try_from(position).unwrap_or(i64::MAX);
            if op.operation_identifier.index != expected {
                return Err(AssertError::OperationIndexOutOfOrder {
                    expected,
                    found: op.operation_identifier.index,
                });
            }
            self.operation(op)?;
        }
        Ok(())
    }

    /// Operations inside blocks must carry a status the network declared.
    pub fn operation(&self, op: &Operation) -> Result<(), AssertError> {
        let index = op.operation_identifier.index;
        if let Some(network_index) = op.operation_identifier.network_index {
            if network_index < 0 {
                return Err(AssertError::Negative {
                    field: "operation_identifier.network_index",
                    value: network_index,
                });
            }
        }

        let mut related_seen = HashSet::new();
        for related in op.related_operations.iter().flatten() {
            if related.index >= index || !related_seen.insert(related.index) {
                return Err(AssertError::InvalidRelatedOperation {
                    operation: index,
                    related: related.index,
                });
            }
        }

        if !self.operation_type_allowed(&op.kind) {
            return Err(AssertError::UnknownOperationType(op.kind.clone()));
        }
        let status = op
            .status
            .as_deref()
            .ok_or(AssertError::MissingOperationStatus(index))?;
        if !self.operation_status_known(status) {
            return Err(AssertError::UnknownOperationStatus(status.to_string()));
        }

        if let Some(account) = &op.account {
            account_identifier(account)?;
        }
        if let Some(a) = &op.amount {
            amount(a)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asserter::tests::asserter;
    use crate::types::{Currency, OperationIdentifier, TransactionIdentifier};

    fn op(index: i64, kind: &str, status: Option<&str>) -> Operation {
        Operation {
            operation_identifier: OperationIdentifier {
                index,
                network_index: None,
            },
            related_operations: None,
            kind: kind.into(),
            status: status.map(String::from),
            account: Some(AccountIdentifier {
                address: "addr1".into(),
                sub_account: None,
                metadata: None,
            }),
            amount: Some(Amount {
                value: "-1000".into(),
                currency: Currency {
                    symbol: "BTC".into(),
                    decimals: 8,
                    metadata: None,
                },
                metadata: None,
            }),
            metadata: None,
        }
    }

    fn tx(hash: &str, ops: Vec<Operation>) -> Transaction {
        Transaction {
            transaction_identifier: TransactionIdentifier::new(hash),
            operations: ops,
            metadata: None,
        }
    }

    fn block(index: i64, txs: Vec<Transaction>) -> Block {
        Block {
            block_identifier: BlockIdentifier::new(index, format!("block {index}")),
            parent_block_identifier: BlockIdentifier::new(
                (index - 1).max(0),
                format!("block {}", (index - 1).max(0)),
            ),
            timestamp: 1_600_000_000_000 + index,
            transactions: txs,
            metadata: None,
        }
    }

    #[test]
    fn valid_block_passes() {
        let b = block(
            5,
            vec![
                tx("tx1", vec![op(0, "TRANSFER", Some("SUCCESS"))]),
                tx("tx2", vec![op(0, "FEE", Some("FAILURE"))]),
            ],
        );
        assert!(asserter().block(&b).is_ok());
    }

    #[test]
    fn genesis_may_be_its_own_parent() {
        let mut b = block(0, vec![]);
        b.timestamp = 0;
        assert!(asserter().block(&b).is_ok());
    }

    #[test]
    fn parent_must_precede() {
        let mut b = block(5, vec![]);
        b.parent_block_identifier.index = 5;
        assert!(matches!(
            asserter().block(&b),
            Err(AssertError::InvalidParentIndex { .. })
        ));
        let mut b = block(5, vec![]);
        b.parent_block_identifier.hash = b.block_identifier.hash.clone();
        assert!(matches!(
            asserter().block(&b),
            Err(AssertError::ParentHashMatchesBlock(_))
        ));
    }

    #[test]
    fn duplicate_transactions_rejected() {
        let b = block(3, vec![tx("tx1", vec![]), tx("tx1", vec![])]);
        assert_eq!(
            asserter().block(&b),
            Err(AssertError::DuplicateTransaction("tx1".into()))
        );
    }

    #[test]
    fn unknown_operation_type_rejected() {
        let b = block(3, vec![tx("tx1", vec![op(0, "MINT", Some("SUCCESS"))])]);
        let err = asserter().block(&b).unwrap_err();
        match err {
            AssertError::InTransaction { hash, source } => {
                assert_eq!(hash, "tx1");
                assert_eq!(*source, AssertError::UnknownOperationType("MINT".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn operation_rules() {
        let a = asserter();
        assert_eq!(
            a.operation(&op(0, "TRANSFER", None)),
            Err(AssertError::MissingOperationStatus(0))
        );
        assert_eq!(
            a.operation(&op(0, "TRANSFER", Some("PENDING"))),
            Err(AssertError::UnknownOperationStatus("PENDING".into()))
        );
        assert!(a.operation(&op(0, "FEE", Some("FAILURE"))).is_ok());

        let mut o = op(1, "TRANSFER", Some("SUCCESS"));
        o.related_operations = Some(vec![OperationIdentifier {
            index: 1,
            network_index: None,
        }]);
        assert!(a.operation(&o).is_err());

        let out_of_order = tx("tx1", vec![op(1, "TRANSFER", Some("SUCCESS"))]);
        assert_eq!(
            a.transaction(&out_of_order),
            Err(AssertError::OperationIndexOutOfOrder {
                expected: 0,
                found: 1
            })
        );
    }

    #[test]
    fn amount_and_timestamp() {
        let mut o = op(0, "TRANSFER", Some("SUCCESS"));
        let mut a = o.amount.take().unwrap();
        assert!(amount(&a).is_ok());
        a.value = "12.5".into();
        assert_eq!(amount(&a), Err(AssertError::InvalidAmount("12.5".into())));
        a.value = "-".into();
        assert!(amount(&a).is_err());

        assert!(timestamp(1_600_000_000_000).is_ok());
        assert!(timestamp(5).is_err());
        assert!(timestamp(i64::MAX).is_err());
    }
}
