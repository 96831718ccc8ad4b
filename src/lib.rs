//! A single-node proof-of-work ledger engine.
//!
//! Blocks are mined with a self-adjusting difficulty, foreign chains are
//! adopted by the longest-valid-chain rule, and balances are always
//! reconstructed from chain history.

pub mod blockchain;
pub mod config;

pub use blockchain::{Block, BlockEntry, Blockchain, ReplaceChainError, Wallet};
pub use config::{LedgerConfig, NodeConfig};
