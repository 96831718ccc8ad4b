// Blockchain module
//
// This module contains the ledger engine:
// - Block structure and proof of work
// - Blockchain structure, validation and fork choice
// - Transactions and reward transactions
// - Wallets and balance reconstruction
// - Cryptography utilities
// - Transaction pool and miner

pub mod block;
pub mod chain;
pub mod crypto;
pub mod miner;
pub mod pool;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::{Block, BlockEntry};
pub use chain::{Blockchain, BlockchainError, ReplaceChainError};
pub use crypto::{Address, DigitalSignature, KeyPair};
pub use miner::TransactionMiner;
pub use pool::TransactionPool;
pub use transaction::{RewardTransaction, Transaction};
pub use wallet::Wallet;
