use std::collections::BTreeMap;

use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::block::now_millis;
use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, KeyPair};

/// Address carried by the input of every reward transaction
pub const REWARD_INPUT_ADDRESS: &str = "*authorized-reward*";

/// Recipient address to amount
pub type OutputMap = BTreeMap<Address, u64>;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid sender address: {0}")]
    InvalidSenderAddress(String),

    #[error("Invalid recipient address: {0}")]
    InvalidRecipientAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Outputs total {outputs} does not match input amount {input}")]
    OutputMismatch { input: u64, outputs: u64 },

    #[error("Invalid reward: {0}")]
    InvalidReward(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Input of a signed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Creation time in milliseconds since the epoch
    pub timestamp: u64,

    /// Sender's address
    pub address: Address,

    /// Sender's balance when the transaction was created
    pub amount: u64,

    /// Sender's signature over the output map
    pub signature: DigitalSignature,
}

/// A transfer signed by the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Where the input amount goes, including the sender's change
    pub output_map: OutputMap,

    pub input: TransactionInput,
}

impl Transaction {
    /// Creates a signed transfer of `amount` from `sender` to `recipient`.
    ///
    /// `sender_balance` becomes the input amount and the sender keeps the
    /// difference as change.
    ///
    /// # Arguments
    ///
    /// * `sender` - The key pair that signs the output map
    /// * `sender_balance` - The sender's balance on the current chain
    /// * `recipient` - The address of the recipient
    /// * `amount` - The amount to transfer
    ///
    /// # Returns
    ///
    /// A signed Transaction, or an error if the amount exceeds the balance
    pub fn new(
        sender: &KeyPair,
        sender_balance: u64,
        recipient: Address,
        amount: u64,
    ) -> Result<Self, TransactionError> {
        check_transfer(sender.address(), &recipient, amount, sender_balance)?;

        let mut output_map = OutputMap::new();
        output_map.insert(recipient, amount);
        output_map.insert(sender.address().clone(), sender_balance - amount);

        let input = Self::create_input(sender, sender_balance, &output_map)?;

        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            output_map,
            input,
        })
    }

    fn create_input(
        sender: &KeyPair,
        balance: u64,
        output_map: &OutputMap,
    ) -> Result<TransactionInput, TransactionError> {
        Ok(TransactionInput {
            timestamp: now_millis(),
            address: sender.address().clone(),
            amount: balance,
            signature: sender.sign(output_map)?,
        })
    }

    /// Sends `amount` more to `recipient` out of the sender's remaining change
    /// and signs the transaction again.
    pub fn update(
        &mut self,
        sender: &KeyPair,
        recipient: Address,
        amount: u64,
    ) -> Result<(), TransactionError> {
        if sender.address() != &self.input.address {
            return Err(TransactionError::InvalidSenderAddress(
                "Key pair does not match the transaction sender".to_string(),
            ));
        }

        let change = self.output_map.get(sender.address()).copied().unwrap_or(0);
        check_transfer(sender.address(), &recipient, amount, change)?;

        let received = self.output_map.entry(recipient).or_insert(0);
        *received = received.checked_add(amount).ok_or_else(|| {
            TransactionError::InvalidAmount("Recipient output overflows".to_string())
        })?;
        self.output_map.insert(sender.address().clone(), change - amount);

        self.input = Self::create_input(sender, self.input.amount, &self.output_map)?;
        Ok(())
    }

    /// Checks conservation of the outputs and the sender's signature
    pub fn validate(&self) -> Result<(), TransactionError> {
        let outputs = outputs_total(&self.output_map)?;

        if outputs != self.input.amount {
            return Err(TransactionError::OutputMismatch {
                input: self.input.amount,
                outputs,
            });
        }

        if !verify_signature(&self.input.address, &self.output_map, &self.input.signature)? {
            return Err(TransactionError::InvalidSignature);
        }

        Ok(())
    }

    /// Same as [`Transaction::validate`], logging the reason on failure
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                error!("Invalid transaction {} from {}: {}", self.id, self.input.address, err);
                false
            }
        }
    }
}

/// Input of a reward transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardInput {
    pub address: Address,
}

/// Reward minted for the miner of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTransaction {
    pub id: String,
    pub output_map: OutputMap,
    pub input: RewardInput,
}

impl RewardTransaction {
    /// Creates a reward paying `reward` to `miner`
    pub fn new(miner: Address, reward: u64) -> Self {
        let mut output_map = OutputMap::new();
        output_map.insert(miner, reward);

        RewardTransaction {
            id: Uuid::new_v4().to_string(),
            output_map,
            input: RewardInput {
                address: Address(REWARD_INPUT_ADDRESS.to_string()),
            },
        }
    }

    /// Checks the reward pays exactly `mining_reward` to a single address
    pub fn validate(&self, mining_reward: u64) -> Result<(), TransactionError> {
        if self.input.address.as_str() != REWARD_INPUT_ADDRESS {
            return Err(TransactionError::InvalidSenderAddress(format!(
                "Reward input must be {}",
                REWARD_INPUT_ADDRESS
            )));
        }

        let mut outputs = self.output_map.values();
        match (outputs.next(), outputs.next()) {
            (Some(&amount), None) if amount == mining_reward => Ok(()),
            (Some(&amount), None) => Err(TransactionError::InvalidReward(format!(
                "expected {}, got {}",
                mining_reward, amount
            ))),
            _ => Err(TransactionError::InvalidReward(format!(
                "expected exactly one output, got {}",
                self.output_map.len()
            ))),
        }
    }
}

/// Sum of all outputs, failing on overflow
pub fn outputs_total(output_map: &OutputMap) -> Result<u64, TransactionError> {
    output_map.values().try_fold(0u64, |total, &value| {
        total
            .checked_add(value)
            .ok_or_else(|| TransactionError::InvalidAmount("Outputs total overflows".to_string()))
    })
}

fn check_transfer(
    sender: &Address,
    recipient: &Address,
    amount: u64,
    available: u64,
) -> Result<(), TransactionError> {
    if amount == 0 {
        return Err(TransactionError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }

    if recipient == sender {
        return Err(TransactionError::InvalidRecipientAddress(
            "Sender cannot be the recipient".to_string(),
        ));
    }

    if amount > available {
        return Err(TransactionError::InsufficientFunds {
            required: amount,
            available,
        });
    }

    Ok(())
}
