use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use log::{error, info};
use thiserror::Error;

use super::block::{Block, BlockEntry, MiningCancelled};
use super::crypto::Address;
use super::wallet::Wallet;
use crate::config::{LedgerConfig, BALANCE_CACHE_CAPACITY};

/// Fatal errors of blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error(transparent)]
    MiningCancelled(#[from] MiningCancelled),

    #[error("Chain integrity violated: {0}")]
    Integrity(String),
}

/// Why an incoming chain was not adopted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplaceChainError {
    #[error("The incoming chain must be longer (incoming {incoming}, current {current})")]
    NotLonger { incoming: usize, current: usize },

    #[error("The incoming chain must be valid")]
    InvalidChain,

    #[error("The incoming chain has invalid transaction data")]
    InvalidTransactionData,
}

/// Represents the blockchain.
///
/// Readers always see a whole chain: writers build a new sequence and
/// publish it with a single swap. Writers are serialised among themselves.
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks
    chain: Arc<ArcSwap<Vec<Block>>>,

    /// Held by `add_block` and `replace_chain` while they run
    writer: Arc<Mutex<()>>,

    /// Balances keyed by (tip hash, address), at most `BALANCE_CACHE_CAPACITY` entries
    balances: Arc<DashMap<(String, Address), u64>>,

    config: LedgerConfig,
}

impl Blockchain {
    /// Creates a blockchain holding only the genesis block
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Blockchain {
            chain: Arc::new(ArcSwap::from_pointee(vec![Block::genesis()])),
            writer: Arc::new(Mutex::new(())),
            balances: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Snapshot of the whole chain
    pub fn chain(&self) -> Arc<Vec<Block>> {
        self.chain.load_full()
    }

    pub fn last_block(&self) -> Block {
        tip(&self.chain.load()).clone()
    }

    /// Mines `data` on top of the current tip and appends the new block
    pub fn add_block(&self, data: Vec<BlockEntry>) -> Block {
        let _writer = self.lock_writer();
        let current = self.chain.load_full();

        let block = Block::mine_block(tip(&current), data, self.config.mine_rate_ms);
        self.append(&current, block.clone());
        block
    }

    /// Same as [`Blockchain::add_block`], but gives up once `cancel` is set.
    /// A cancelled attempt leaves the chain untouched.
    pub fn add_block_cancellable(
        &self,
        data: Vec<BlockEntry>,
        cancel: &AtomicBool,
    ) -> Result<Block, BlockchainError> {
        let _writer = self.lock_writer();
        let current = self.chain.load_full();

        let block = Block::mine_block_cancellable(
            tip(&current),
            data,
            self.config.mine_rate_ms,
            cancel,
        )?;
        self.append(&current, block.clone());
        Ok(block)
    }

    fn append(&self, current: &Arc<Vec<Block>>, block: Block) {
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(block);

        self.chain.store(Arc::new(next));
        self.balances.clear();
        info!("Appended block {} to the chain", current.len());
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Checks that `chain` starts at genesis and that every other block is
    /// correctly hashed, linked to its predecessor, meets its own difficulty
    /// and moves difficulty by at most one.
    pub fn is_valid_chain(chain: &[Block]) -> bool {
        match chain.first() {
            Some(first) if *first == Block::genesis() => {}
            _ => return false,
        }

        for pair in chain.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);

            if block.prev_hash != previous.hash {
                return false;
            }

            if block.hash != block.calculate_hash() {
                return false;
            }

            if block.difficulty == 0 || !Block::meets_difficulty(&block.hash, block.difficulty) {
                return false;
            }

            if block.difficulty.abs_diff(previous.difficulty) > 1 {
                return false;
            }
        }

        true
    }

    /// Verifies the chain currently held
    pub fn verify_integrity(&self) -> Result<(), BlockchainError> {
        let chain = self.chain.load();

        if !Self::is_valid_chain(&chain) {
            return Err(BlockchainError::Integrity(format!(
                "local chain of length {} fails validation",
                chain.len()
            )));
        }

        Ok(())
    }

    /// Adopts `new_chain` if it is longer and valid.
    ///
    /// With `validate_transactions` the ledger rules of
    /// [`Blockchain::valid_transaction_data`] are checked as well.
    pub fn replace_chain(
        &self,
        new_chain: Vec<Block>,
        validate_transactions: bool,
    ) -> Result<(), ReplaceChainError> {
        self.replace_chain_with(new_chain, validate_transactions, |_| {})
    }

    /// Same as [`Blockchain::replace_chain`], calling `on_success` with the
    /// adopted chain after the swap
    ///
    /// # Arguments
    ///
    /// * `new_chain` - The candidate chain, genesis first
    /// * `validate_transactions` - Whether to also check the embedded transactions
    /// * `on_success` - Called with the adopted chain, while writers are still blocked
    ///
    /// # Returns
    ///
    /// Ok if the chain was replaced, otherwise the reason it was rejected
    pub fn replace_chain_with<F>(
        &self,
        new_chain: Vec<Block>,
        validate_transactions: bool,
        on_success: F,
    ) -> Result<(), ReplaceChainError>
    where
        F: FnOnce(&[Block]),
    {
        let _writer = self.lock_writer();
        let current = self.chain.load_full();

        if new_chain.len() <= current.len() {
            let err = ReplaceChainError::NotLonger {
                incoming: new_chain.len(),
                current: current.len(),
            };
            error!("{}", err);
            return Err(err);
        }

        if !Self::is_valid_chain(&new_chain) {
            let err = ReplaceChainError::InvalidChain;
            error!("{}", err);
            return Err(err);
        }

        if validate_transactions && !self.valid_transaction_data(&new_chain) {
            let err = ReplaceChainError::InvalidTransactionData;
            error!("{}", err);
            return Err(err);
        }

        let adopted = Arc::new(new_chain);
        self.chain.store(adopted.clone());
        self.balances.clear();
        info!(
            "Replacing chain: {} -> {} blocks",
            current.len(),
            adopted.len()
        );

        on_success(adopted.as_slice());
        Ok(())
    }

    /// Checks the transactions embedded in every block of `chain`.
    ///
    /// Per block: at most one reward, paying exactly the mining reward to a
    /// single address; at most one transfer per sender; every transfer
    /// conserves its input, carries a valid signature, and spends no more
    /// than the sender's balance on the chain preceding the block.
    /// Transaction ids must be unique over the whole chain.
    pub fn valid_transaction_data(&self, chain: &[Block]) -> bool {
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (index, block) in chain.iter().enumerate().skip(1) {
            let history = &chain[..index];
            let mut reward_count = 0;
            let mut senders: HashSet<&Address> = HashSet::new();

            for entry in &block.data {
                if let Some(id) = entry.transaction_id() {
                    if !seen_ids.insert(id) {
                        error!("Transaction {} appears more than once (block {})", id, index);
                        return false;
                    }
                }

                match entry {
                    BlockEntry::Reward(reward) => {
                        reward_count += 1;
                        if reward_count > 1 {
                            error!("Miner rewards exceed limit in block {}", index);
                            return false;
                        }

                        if let Err(err) = reward.validate(self.config.mining_reward) {
                            error!("Miner reward in block {} is invalid: {}", index, err);
                            return false;
                        }
                    }
                    BlockEntry::Transfer(transaction) => {
                        if !transaction.is_valid() {
                            return false;
                        }

                        if !senders.insert(&transaction.input.address) {
                            error!(
                                "Sender {} has more than one transfer in block {}",
                                transaction.input.address, index
                            );
                            return false;
                        }

                        let true_balance = Wallet::calculate_balance(
                            history,
                            &transaction.input.address,
                            self.config.starting_balance,
                        );

                        if transaction.input.amount > true_balance {
                            error!(
                                "Invalid input amount {} for {} in block {}, balance is {}",
                                transaction.input.amount,
                                transaction.input.address,
                                index,
                                true_balance
                            );
                            return false;
                        }
                    }
                    BlockEntry::Raw { .. } => {}
                }
            }
        }

        true
    }

    /// Balance of `address` at the current tip, memoised until the chain changes.
    /// Once the cache is full, further addresses are computed but not stored.
    pub fn balance_of(&self, address: &Address) -> u64 {
        let chain = self.chain.load_full();
        let key = (tip(&chain).hash.clone(), address.clone());

        if let Some(balance) = self.balances.get(&key) {
            return *balance;
        }

        let balance = Wallet::calculate_balance(&chain, address, self.config.starting_balance);
        if self.balances.len() < BALANCE_CACHE_CAPACITY {
            self.balances.insert(key, balance);
        }
        balance
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Last block of a chain held by a [`Blockchain`], which always has genesis
fn tip(chain: &[Block]) -> &Block {
    &chain[chain.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::{RewardTransaction, Transaction};
    use std::sync::atomic::Ordering;

    fn test_config() -> LedgerConfig {
        LedgerConfig {
            mine_rate_ms: 1,
            ..LedgerConfig::default()
        }
    }

    fn blockchain() -> Blockchain {
        let _ = env_logger::builder().is_test(true).try_init();
        Blockchain::with_config(test_config())
    }

    fn raw_chain(blocks: &[&str]) -> Blockchain {
        let blockchain = blockchain();
        for data in blocks {
            blockchain.add_block(vec![BlockEntry::raw(*data)]);
        }
        blockchain
    }

    fn chain_vec(blockchain: &Blockchain) -> Vec<Block> {
        blockchain.chain().as_ref().clone()
    }

    #[test]
    fn test_starts_with_genesis() {
        let blockchain = blockchain();
        let chain = blockchain.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0], Block::genesis());
        assert!(blockchain.verify_integrity().is_ok());
    }

    #[test]
    fn test_add_block() {
        let blockchain = blockchain();
        let block = blockchain.add_block(vec![BlockEntry::raw("Poems the Cat")]);

        let chain = blockchain.chain();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1], block);
        assert_eq!(blockchain.last_block().data, vec![BlockEntry::raw("Poems the Cat")]);
        assert_eq!(block.prev_hash, chain[0].hash);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_appends() {
        let blockchain = blockchain();
        let before = blockchain.chain();

        blockchain.add_block(vec![BlockEntry::raw("Cat")]);

        assert_eq!(before.len(), 1);
        assert_eq!(blockchain.chain().len(), 2);
    }

    #[test]
    fn test_cancelled_add_block_leaves_chain_untouched() {
        let blockchain = blockchain();
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::Relaxed);

        let result = blockchain.add_block_cancellable(vec![BlockEntry::raw("Cat")], &cancel);

        assert!(matches!(result, Err(BlockchainError::MiningCancelled(_))));
        assert_eq!(blockchain.chain().len(), 1);
    }

    #[test]
    fn test_add_block_cancellable_mines_when_not_cancelled() {
        let blockchain = blockchain();
        let cancel = AtomicBool::new(false);

        let block = blockchain
            .add_block_cancellable(vec![BlockEntry::raw("Cat")], &cancel)
            .unwrap();

        assert_eq!(blockchain.last_block(), block);
    }

    #[test]
    fn test_valid_chain() {
        let blockchain = raw_chain(&["Cat", "Another Cat", "Poetry"]);
        assert!(Blockchain::is_valid_chain(&blockchain.chain()));
    }

    #[test]
    fn test_chain_without_genesis_is_invalid() {
        let blockchain = raw_chain(&["Cat"]);
        let mut chain = chain_vec(&blockchain);
        chain[0].data = vec![BlockEntry::raw("fake-genesis")];

        assert!(!Blockchain::is_valid_chain(&chain));
        assert!(!Blockchain::is_valid_chain(&[]));
    }

    #[test]
    fn test_broken_prev_hash_is_invalid() {
        let mut chain = chain_vec(&raw_chain(&["Cat", "Another Cat", "Poetry"]));
        chain[2].prev_hash = "broken-prevHash".to_string();

        assert!(!Blockchain::is_valid_chain(&chain));
    }

    #[test]
    fn test_any_single_field_change_is_invalid() {
        let chain = chain_vec(&raw_chain(&["Cat", "Another Cat", "Poetry"]));

        let mutations: Vec<Box<dyn Fn(&mut Block)>> = vec![
            Box::new(|b: &mut Block| b.hash = "fakeness".to_string()),
            Box::new(|b: &mut Block| b.prev_hash = "fakeness".to_string()),
            Box::new(|b: &mut Block| b.data = vec![BlockEntry::raw("basement-cat-data")]),
            Box::new(|b: &mut Block| b.nonce += 1),
            Box::new(|b: &mut Block| b.difficulty += 1),
            Box::new(|b: &mut Block| b.timestamp += 1),
        ];

        for index in 1..chain.len() {
            for mutate in &mutations {
                let mut tampered = chain.clone();
                mutate(&mut tampered[index]);
                assert!(!Blockchain::is_valid_chain(&tampered), "block {}", index);
            }
        }
    }

    /// Builds a block on `previous` at an arbitrary difficulty with a real proof of work
    fn forge_block(previous: &Block, difficulty: u32) -> Block {
        let mut block = Block {
            timestamp: previous.timestamp + 1,
            prev_hash: previous.hash.clone(),
            hash: String::new(),
            nonce: 0,
            difficulty,
            data: Vec::new(),
        };

        loop {
            block.hash = block.calculate_hash();
            if Block::meets_difficulty(&block.hash, block.difficulty) {
                return block;
            }
            block.nonce += 1;
        }
    }

    #[test]
    fn test_jumped_difficulty_is_invalid() {
        let genesis = Block::genesis();

        // Genesis sits at difficulty 3, so 1 is a jump of two
        let jumped = forge_block(&genesis, genesis.difficulty - 2);
        assert!(!Blockchain::is_valid_chain(&[genesis.clone(), jumped]));

        let stepped = forge_block(&genesis, genesis.difficulty - 1);
        assert!(Blockchain::is_valid_chain(&[genesis, stepped]));
    }

    #[test]
    fn test_block_without_proof_of_work_is_invalid() {
        let mut chain = chain_vec(&raw_chain(&["Cat"]));
        let mut lazy = forge_block(chain.last().unwrap(), chain.last().unwrap().difficulty);

        // Correctly hashed, but the hash no longer meets the difficulty
        loop {
            lazy.nonce += 1;
            lazy.hash = lazy.calculate_hash();
            if !Block::meets_difficulty(&lazy.hash, lazy.difficulty) {
                break;
            }
        }

        chain.push(lazy);
        assert!(!Blockchain::is_valid_chain(&chain));
    }

    #[test]
    fn test_zero_difficulty_is_invalid() {
        let mut chain = chain_vec(&raw_chain(&[]));
        let genesis = chain[0].clone();
        let step = forge_block(&genesis, 2);
        let floor = forge_block(&step, 1);
        chain.extend([step, floor.clone()]);
        assert!(Blockchain::is_valid_chain(&chain));

        chain.push(forge_block(&floor, 0));
        assert!(!Blockchain::is_valid_chain(&chain));
    }

    #[test]
    fn test_replace_with_shorter_chain_is_rejected() {
        let blockchain = raw_chain(&["Cat", "Dog"]);
        let original = blockchain.chain();
        let shorter = chain_vec(&raw_chain(&["Cat"]));

        let result = blockchain.replace_chain(shorter, false);

        assert!(matches!(result, Err(ReplaceChainError::NotLonger { incoming: 2, current: 3 })));
        assert_eq!(blockchain.chain(), original);
    }

    #[test]
    fn test_replace_with_equal_length_chain_is_rejected() {
        let blockchain = raw_chain(&["Cat"]);
        let original = blockchain.chain();
        let same_length = chain_vec(&raw_chain(&["Dog"]));

        assert!(blockchain.replace_chain(same_length, false).is_err());
        assert_eq!(blockchain.chain(), original);
    }

    #[test]
    fn test_replace_with_invalid_longer_chain_is_rejected() {
        let blockchain = blockchain();
        let original = blockchain.chain();
        let mut longer = chain_vec(&raw_chain(&["Cat", "Another Cat", "Poetry"]));
        longer[2].hash = "fakeness".to_string();

        let result = blockchain.replace_chain(longer, false);

        assert_eq!(result, Err(ReplaceChainError::InvalidChain));
        assert_eq!(blockchain.chain(), original);
    }

    #[test]
    fn test_replace_with_valid_longer_chain() {
        let blockchain = blockchain();
        let longer = chain_vec(&raw_chain(&["Cat", "Another Cat", "Poetry"]));
        let mut adopted_len = 0;

        let result = blockchain.replace_chain_with(longer.clone(), false, |chain| {
            adopted_len = chain.len();
        });

        assert!(result.is_ok());
        assert_eq!(*blockchain.chain(), longer);
        assert_eq!(adopted_len, 4);
    }

    #[test]
    fn test_on_success_not_called_on_rejection() {
        let blockchain = raw_chain(&["Cat"]);
        let mut called = false;

        let _ = blockchain.replace_chain_with(vec![Block::genesis()], false, |_| called = true);

        assert!(!called);
    }

    mod ledger {
        use super::*;

        struct Fixture {
            blockchain: Blockchain,
            candidate: Blockchain,
            wallet: Wallet,
            transaction: Transaction,
            reward: RewardTransaction,
        }

        fn fixture() -> Fixture {
            let blockchain = blockchain();
            let candidate = super::blockchain();
            let wallet = Wallet::new();
            let transaction = wallet
                .create_transaction(
                    Address("foo-address".to_string()),
                    65,
                    &candidate.chain(),
                    candidate.config().starting_balance,
                )
                .unwrap();
            let reward =
                RewardTransaction::new(wallet.address().clone(), candidate.config().mining_reward);

            Fixture {
                blockchain,
                candidate,
                wallet,
                transaction,
                reward,
            }
        }

        #[test]
        fn test_valid_transaction_data() {
            let f = fixture();
            f.candidate.add_block(vec![
                BlockEntry::Transfer(f.transaction),
                BlockEntry::Reward(f.reward),
            ]);

            assert!(f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_multiple_rewards_are_invalid() {
            let f = fixture();
            let second = RewardTransaction::new(f.wallet.address().clone(), 50);
            f.candidate.add_block(vec![
                BlockEntry::Transfer(f.transaction),
                BlockEntry::Reward(f.reward),
                BlockEntry::Reward(second),
            ]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_duplicated_reward_is_invalid() {
            let f = fixture();
            f.candidate.add_block(vec![
                BlockEntry::Reward(f.reward.clone()),
                BlockEntry::Reward(f.reward),
            ]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_malformed_transfer_output_map_is_invalid() {
            let mut f = fixture();
            f.transaction
                .output_map
                .insert(f.wallet.address().clone(), 999_999);
            f.candidate.add_block(vec![
                BlockEntry::Transfer(f.transaction),
                BlockEntry::Reward(f.reward),
            ]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_malformed_reward_output_map_is_invalid() {
            let mut f = fixture();
            f.reward.output_map.insert(f.wallet.address().clone(), 999_999);
            f.candidate.add_block(vec![
                BlockEntry::Transfer(f.transaction),
                BlockEntry::Reward(f.reward),
            ]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_forged_signature_is_invalid() {
            let mut f = fixture();
            // Same totals, different distribution, old signature
            let recipient = Address("foo-address".to_string());
            f.transaction.output_map.insert(recipient, 100);
            f.transaction
                .output_map
                .insert(f.wallet.address().clone(), 900);
            f.candidate.add_block(vec![BlockEntry::Transfer(f.transaction)]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_overspending_input_is_invalid() {
            let f = fixture();
            let key_pair = f.wallet.key_pair();

            // Signed honestly, but claims a balance the wallet never had
            let inflated =
                Transaction::new(key_pair, 9000, Address("foo-address".to_string()), 8000).unwrap();
            f.candidate.add_block(vec![BlockEntry::Transfer(inflated)]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_balance_is_checked_against_preceding_blocks() {
            let f = fixture();

            // Spend 65, then try to spend the full starting balance again
            f.candidate.add_block(vec![BlockEntry::Transfer(f.transaction)]);
            let replay = Transaction::new(
                f.wallet.key_pair(),
                f.candidate.config().starting_balance,
                Address("bar-address".to_string()),
                500,
            )
            .unwrap();
            f.candidate.add_block(vec![BlockEntry::Transfer(replay)]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_spending_received_funds_is_valid() {
            let f = fixture();
            let receiver = Wallet::new();
            let gift = Wallet::new()
                .create_transaction(receiver.address().clone(), 300, &f.candidate.chain(), 1000)
                .unwrap();
            f.candidate.add_block(vec![BlockEntry::Transfer(gift)]);

            let spend = receiver
                .create_transaction(Address("shop".to_string()), 1200, &f.candidate.chain(), 1000)
                .unwrap();
            f.candidate.add_block(vec![BlockEntry::Transfer(spend)]);

            assert!(f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_identical_transactions_in_block_are_invalid() {
            let f = fixture();
            f.candidate.add_block(vec![
                BlockEntry::Transfer(f.transaction.clone()),
                BlockEntry::Transfer(f.transaction),
            ]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_transaction_replayed_in_later_block_is_invalid() {
            let f = fixture();
            f.candidate.add_block(vec![BlockEntry::Transfer(f.transaction.clone())]);
            f.candidate.add_block(vec![BlockEntry::Transfer(f.transaction)]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_two_transfers_from_one_sender_in_block_are_invalid() {
            let f = fixture();
            let second = f
                .wallet
                .create_transaction(Address("bar-address".to_string()), 10, &f.candidate.chain(), 1000)
                .unwrap();
            f.candidate.add_block(vec![
                BlockEntry::Transfer(f.transaction),
                BlockEntry::Transfer(second),
            ]);

            assert!(!f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_raw_entries_are_ignored() {
            let f = fixture();
            f.candidate.add_block(vec![
                BlockEntry::raw("notes"),
                BlockEntry::Transfer(f.transaction),
                BlockEntry::Reward(f.reward),
            ]);

            assert!(f.blockchain.valid_transaction_data(&f.candidate.chain()));
        }

        #[test]
        fn test_replace_chain_checks_transaction_data() {
            let f = fixture();
            let original = f.blockchain.chain();
            let second = RewardTransaction::new(f.wallet.address().clone(), 50);
            f.candidate.add_block(vec![
                BlockEntry::Reward(f.reward),
                BlockEntry::Reward(second),
            ]);
            let candidate = f.candidate.chain().as_ref().clone();

            let result = f.blockchain.replace_chain(candidate.clone(), true);
            assert_eq!(result, Err(ReplaceChainError::InvalidTransactionData));
            assert_eq!(f.blockchain.chain(), original);

            // Without ledger checks the structurally valid chain is adopted
            assert!(f.blockchain.replace_chain(candidate.clone(), false).is_ok());
            assert_eq!(*f.blockchain.chain(), candidate);
        }

        #[test]
        fn test_replace_chain_with_valid_transaction_data() {
            let f = fixture();
            f.candidate.add_block(vec![
                BlockEntry::Transfer(f.transaction),
                BlockEntry::Reward(f.reward),
            ]);
            let candidate = f.candidate.chain().as_ref().clone();

            assert!(f.blockchain.replace_chain(candidate.clone(), true).is_ok());
            assert_eq!(*f.blockchain.chain(), candidate);
        }

        #[test]
        fn test_balance_of_follows_chain_changes() {
            let f = fixture();
            let address = f.wallet.address().clone();
            assert_eq!(f.blockchain.balance_of(&address), 1000);

            f.blockchain.add_block(vec![BlockEntry::Reward(f.reward)]);
            assert_eq!(f.blockchain.balance_of(&address), 1050);
            assert_eq!(f.blockchain.balance_of(&address), 1050);

            f.candidate.add_block(vec![BlockEntry::Transfer(f.transaction)]);
            f.candidate.add_block(vec![BlockEntry::raw("filler")]);
            f.blockchain
                .replace_chain(f.candidate.chain().as_ref().clone(), true)
                .unwrap();
            assert_eq!(f.blockchain.balance_of(&address), 935);
        }

        #[test]
        fn test_balance_cache_is_bounded() {
            let blockchain = super::blockchain();

            for i in 0..BALANCE_CACHE_CAPACITY + 16 {
                let address = Address(format!("address-{}", i));
                assert_eq!(blockchain.balance_of(&address), 1000);
            }

            assert_eq!(blockchain.balances.len(), BALANCE_CACHE_CAPACITY);

            // Uncached addresses are still answered
            let late = Address(format!("address-{}", BALANCE_CACHE_CAPACITY + 1));
            assert_eq!(blockchain.balance_of(&late), 1000);
        }
    }
}
