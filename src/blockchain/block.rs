use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::crypto::crypto_hash;
use super::transaction::{RewardTransaction, Transaction};
use crate::config::INITIAL_DIFFICULTY;

/// Timestamp of the genesis block
pub const GENESIS_TIMESTAMP: u64 = 1;

/// Previous hash carried by the genesis block
pub const GENESIS_PREV_HASH: &str = "-----";

/// Hash of the genesis block. It is a label, not a digest of its fields.
pub const GENESIS_HASH: &str = "hash-one";

/// Returned when a cancellable mining attempt is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Mining was cancelled")]
pub struct MiningCancelled;

/// One item of a block's payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockEntry {
    Reward(RewardTransaction),
    Transfer(Transaction),

    /// Content with no ledger meaning
    Raw { content: serde_json::Value },
}

impl BlockEntry {
    pub fn raw<T: Into<serde_json::Value>>(content: T) -> Self {
        BlockEntry::Raw {
            content: content.into(),
        }
    }

    /// Identifier of the transaction, if the entry is one
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            BlockEntry::Reward(reward) => Some(&reward.id),
            BlockEntry::Transfer(transaction) => Some(&transaction.id),
            BlockEntry::Raw { .. } => None,
        }
    }
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Creation time in milliseconds since the epoch
    pub timestamp: u64,

    /// Hash of the previous block
    pub prev_hash: String,

    /// Hash of this block's other fields
    pub hash: String,

    /// Proof of work
    pub nonce: u64,

    /// Number of leading hex zeros required in `hash`
    pub difficulty: u32,

    pub data: Vec<BlockEntry>,
}

impl Block {
    /// The block every chain starts with
    pub fn genesis() -> Self {
        Block {
            timestamp: GENESIS_TIMESTAMP,
            prev_hash: GENESIS_PREV_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            nonce: 0,
            difficulty: INITIAL_DIFFICULTY,
            data: Vec::new(),
        }
    }

    /// Recomputes the hash of this block from its fields
    pub fn calculate_hash(&self) -> String {
        compute_hash(
            self.timestamp,
            &self.prev_hash,
            self.difficulty,
            self.nonce,
            &encode_data(&self.data),
        )
    }

    /// Whether `hash` starts with `difficulty` zero characters
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let difficulty = difficulty as usize;
        hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Difficulty for a block created at `timestamp` on top of `origin`.
    ///
    /// Slower than `mine_rate` lowers it by one, never below 1. Anything
    /// else raises it by one.
    pub fn adjust_difficulty(origin: &Block, timestamp: u64, mine_rate: u64) -> u32 {
        let difficulty = origin.difficulty;

        if difficulty < 1 {
            return 1;
        }

        if timestamp.saturating_sub(origin.timestamp) > mine_rate {
            (difficulty - 1).max(1)
        } else {
            difficulty.saturating_add(1)
        }
    }

    /// Mines a block on top of `last_block`. Runs until a nonce is found.
    ///
    /// # Arguments
    ///
    /// * `last_block` - The current tip
    /// * `data` - The entries to store in the new block
    /// * `mine_rate` - Target time between blocks in milliseconds
    ///
    /// # Returns
    ///
    /// The mined block, linked to `last_block`
    pub fn mine_block(last_block: &Block, data: Vec<BlockEntry>, mine_rate: u64) -> Block {
        match Self::search(last_block, data, mine_rate, || Ok::<(), Infallible>(())) {
            Ok(block) => block,
            Err(never) => match never {},
        }
    }

    /// Mines a block on top of `last_block`, giving up once `cancel` is set
    pub fn mine_block_cancellable(
        last_block: &Block,
        data: Vec<BlockEntry>,
        mine_rate: u64,
        cancel: &AtomicBool,
    ) -> Result<Block, MiningCancelled> {
        Self::search(last_block, data, mine_rate, || {
            if cancel.load(Ordering::Relaxed) {
                Err(MiningCancelled)
            } else {
                Ok(())
            }
        })
    }

    fn search<E>(
        last_block: &Block,
        data: Vec<BlockEntry>,
        mine_rate: u64,
        mut check: impl FnMut() -> Result<(), E>,
    ) -> Result<Block, E> {
        let encoded = encode_data(&data);
        let mut nonce: u64 = 0;

        loop {
            check()?;

            nonce = nonce.wrapping_add(1);
            let timestamp = now_millis();
            let difficulty = Self::adjust_difficulty(last_block, timestamp, mine_rate);
            let hash = compute_hash(timestamp, &last_block.hash, difficulty, nonce, &encoded);

            if Self::meets_difficulty(&hash, difficulty) {
                log::debug!("Found nonce {} at difficulty {}", nonce, difficulty);

                return Ok(Block {
                    timestamp,
                    prev_hash: last_block.hash.clone(),
                    hash,
                    nonce,
                    difficulty,
                    data,
                });
            }
        }
    }
}

/// Single encoding of the hashed fields, shared by mining and validation
fn compute_hash(timestamp: u64, prev_hash: &str, difficulty: u32, nonce: u64, data: &str) -> String {
    crypto_hash(&[
        timestamp.to_string(),
        prev_hash.to_string(),
        difficulty.to_string(),
        nonce.to_string(),
        data.to_string(),
    ])
}

fn encode_data(data: &[BlockEntry]) -> String {
    json!(data).to_string()
}

pub(crate) fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
