use std::sync::atomic::AtomicBool;

use log::info;

use super::block::{Block, BlockEntry};
use super::chain::{Blockchain, BlockchainError};
use super::pool::TransactionPool;
use super::transaction::RewardTransaction;
use super::wallet::Wallet;

/// Turns the pending pool into a block paying the node's wallet
#[derive(Debug, Clone)]
pub struct TransactionMiner {
    blockchain: Blockchain,
    pool: TransactionPool,
    wallet: Wallet,
}

impl TransactionMiner {
    pub fn new(blockchain: Blockchain, pool: TransactionPool, wallet: Wallet) -> Self {
        TransactionMiner {
            blockchain,
            pool,
            wallet,
        }
    }

    /// Mines every valid pending transaction plus a reward, then drops the
    /// mined ones from the pool. Transactions pooled during the mine stay.
    pub fn mine_transactions(&self) -> Block {
        let block = self.blockchain.add_block(self.block_data());
        self.finish(&block);
        block
    }

    /// Same as [`TransactionMiner::mine_transactions`], stopping once `cancel`
    /// is set. The pool is untouched when mining is cancelled.
    pub fn mine_transactions_cancellable(
        &self,
        cancel: &AtomicBool,
    ) -> Result<Block, BlockchainError> {
        let block = self
            .blockchain
            .add_block_cancellable(self.block_data(), cancel)?;
        self.finish(&block);
        Ok(block)
    }

    fn block_data(&self) -> Vec<BlockEntry> {
        let mut data: Vec<BlockEntry> = self
            .pool
            .valid_transactions()
            .into_iter()
            .map(BlockEntry::Transfer)
            .collect();

        data.push(BlockEntry::Reward(RewardTransaction::new(
            self.wallet.address().clone(),
            self.blockchain.config().mining_reward,
        )));

        data
    }

    fn finish(&self, block: &Block) {
        self.pool.clear_blockchain_transactions(&self.blockchain.chain());
        info!(
            "Mined block {} with {} entries",
            block.hash,
            block.data.len()
        );
    }
}
