use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use log::warn;

use super::block::{Block, BlockEntry};
use super::crypto::Address;
use super::transaction::Transaction;

/// Transfers waiting to be mined, keyed by transaction id
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    transactions: Arc<DashMap<String, Transaction>>,
}

impl TransactionPool {
    pub fn new() -> Self {
        TransactionPool::default()
    }

    /// Inserts a transaction, replacing any earlier version with the same id
    pub fn set_transaction(&self, transaction: Transaction) {
        self.transactions.insert(transaction.id.clone(), transaction);
    }

    /// The pending transaction sent by `address`, if there is one
    pub fn existing_transaction(&self, address: &Address) -> Option<Transaction> {
        self.transactions
            .iter()
            .find(|entry| &entry.value().input.address == address)
            .map(|entry| entry.value().clone())
    }

    /// Pending transactions that pass their own validation
    pub fn valid_transactions(&self) -> Vec<Transaction> {
        let mut valid: Vec<Transaction> = self
            .transactions
            .iter()
            .map(|entry| entry.value().clone())
            .filter(Transaction::is_valid)
            .collect();

        // Iteration order of the map is arbitrary
        valid.sort_by_key(|transaction| transaction.input.timestamp);
        valid
    }

    /// Snapshot of the pool keyed by id
    pub fn transaction_map(&self) -> BTreeMap<String, Transaction> {
        self.transactions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Drops every pooled transaction whose id is already part of `chain`.
    ///
    /// A pooled version that differs from the mined one (updated while the
    /// block was being mined) is dropped too, since its id can no longer be
    /// included. The sender has to submit a new transaction.
    pub fn clear_blockchain_transactions(&self, chain: &[Block]) {
        let mined: HashMap<&str, &Transaction> = chain
            .iter()
            .skip(1)
            .flat_map(|block| block.data.iter())
            .filter_map(|entry| match entry {
                BlockEntry::Transfer(transaction) => Some((transaction.id.as_str(), transaction)),
                _ => None,
            })
            .collect();

        self.transactions.retain(|id, pending| match mined.get(id.as_str()) {
            None => true,
            Some(&mined_version) => {
                if *mined_version != *pending {
                    warn!(
                        "Dropping transaction {} from {}: it was updated after being mined",
                        id, pending.input.address
                    );
                }
                false
            }
        });
    }
}
