use thiserror::Error;

use super::block::{Block, BlockEntry};
use super::crypto::{Address, KeyPair};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Amount {amount} exceeds balance {balance}")]
    AmountExceedsBalance { amount: u64, balance: u64 },

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
}

/// A key pair whose balance is always derived from chain history
#[derive(Debug, Clone)]
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Creates a wallet with a fresh random key pair
    pub fn new() -> Self {
        Wallet {
            key_pair: KeyPair::generate(),
        }
    }

    pub fn address(&self) -> &Address {
        self.key_pair.address()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// This wallet's balance as of the tip of `chain`
    pub fn balance(&self, chain: &[Block], starting_balance: u64) -> u64 {
        Self::calculate_balance(chain, self.address(), starting_balance)
    }

    /// Creates a transfer funded by this wallet's balance on `chain`
    pub fn create_transaction(
        &self,
        recipient: Address,
        amount: u64,
        chain: &[Block],
        starting_balance: u64,
    ) -> Result<Transaction, WalletError> {
        let balance = self.balance(chain, starting_balance);

        if amount > balance {
            return Err(WalletError::AmountExceedsBalance { amount, balance });
        }

        Ok(Transaction::new(&self.key_pair, balance, recipient, amount)?)
    }

    /// Reconstructs the balance of `address` by scanning `chain` backwards.
    ///
    /// Blocks are walked from the tip towards genesis and every output paid to
    /// `address` is added up. The walk stops after the first block (from the
    /// tip) that holds a transfer sent by `address`: that transfer's change
    /// output already states the balance as of then, so older history is not
    /// needed and the starting balance is not added. Outputs to `address` in
    /// that same block count, whichever position they have in the block.
    ///
    /// Genesis is skipped. Raw entries carry no funds.
    ///
    /// # Arguments
    ///
    /// * `chain` - The chain to scan, genesis first
    /// * `address` - The address whose balance is wanted
    /// * `starting_balance` - Funds owned before the address first sent anything
    ///
    /// # Returns
    ///
    /// The balance of `address` at the tip of `chain`
    pub fn calculate_balance(chain: &[Block], address: &Address, starting_balance: u64) -> u64 {
        let mut outputs_total: u64 = 0;
        let mut has_sent = false;

        for block in chain.iter().skip(1).rev() {
            for entry in &block.data {
                let output_map = match entry {
                    BlockEntry::Transfer(transaction) => {
                        if &transaction.input.address == address {
                            has_sent = true;
                        }
                        &transaction.output_map
                    }
                    BlockEntry::Reward(reward) => &reward.output_map,
                    BlockEntry::Raw { .. } => continue,
                };

                if let Some(&amount) = output_map.get(address) {
                    outputs_total = outputs_total.saturating_add(amount);
                }
            }

            if has_sent {
                return outputs_total;
            }
        }

        starting_balance.saturating_add(outputs_total)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
