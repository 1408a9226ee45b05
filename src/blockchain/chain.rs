use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;

use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, MutexGuard};

use super::block::{Block, MiningOutcome, GENESIS_PREVIOUS_HASH};
use super::crypto::{Address, CryptoContext};
use super::transaction::Transaction;
use crate::config::LedgerConfig;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid chain at block {index}: {reason}")]
    InvalidChain { index: usize, reason: String },

    #[error("Mining was cancelled")]
    MiningCancelled,
}

/// Locks a mutex, recovering the data if a previous holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Represents the blockchain
///
/// The chain and the pending queue are only mutated through
/// [`Blockchain::add_transaction`] and [`Blockchain::mine_pending_transactions`];
/// readers get snapshots.
#[derive(Debug)]
pub struct Blockchain {
    /// The chain of blocks
    chain: Mutex<Vec<Block>>,

    /// Pending transactions to be included in the next block
    pending_transactions: Mutex<Vec<Transaction>>,

    /// Serializes chain growth; the pending queue stays open while a block is mined
    mining: Mutex<()>,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: usize,

    /// Mining reward
    mining_reward: f64,

    crypto: CryptoContext,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block and default settings
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Creates a new blockchain with a genesis block
    pub fn with_config(config: LedgerConfig) -> Self {
        Blockchain {
            chain: Mutex::new(vec![Self::create_genesis_block()]),
            pending_transactions: Mutex::new(Vec::new()),
            mining: Mutex::new(()),
            difficulty: config.difficulty,
            mining_reward: config.mining_reward,
            crypto: CryptoContext::new(),
        }
    }

    /// Creates the genesis block (first block in the chain)
    ///
    /// Its contents are fixed, so every ledger starts from the same block.
    pub fn create_genesis_block() -> Block {
        let genesis = Block::new(
            DateTime::<Utc>::default(),
            Vec::new(),
            GENESIS_PREVIOUS_HASH.to_string(),
        );
        debug!("Created genesis block {}", genesis.hash);
        genesis
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    /// The cryptographic context used to verify transactions
    pub fn crypto(&self) -> &CryptoContext {
        &self.crypto
    }

    /// Gets the last block in the chain
    pub fn get_latest_block(&self) -> Block {
        let chain = lock(&self.chain);
        match chain.last() {
            Some(block) => block.clone(),
            // The chain always holds the genesis block
            None => Self::create_genesis_block(),
        }
    }

    /// Adds a new transaction to the pending transactions
    ///
    /// The transaction needs a sender, a recipient, a finite non-negative
    /// amount and a valid signature. The sender's balance is not checked.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<(), BlockchainError> {
        if let Err(err) = self.check_transaction(&transaction) {
            warn!("Rejected transaction {}: {}", transaction.calculate_hash(), err);
            return Err(err);
        }

        info!(
            "Accepted transaction {} of {} to {}",
            transaction.calculate_hash(),
            transaction.amount,
            transaction.to_address
        );
        lock(&self.pending_transactions).push(transaction);

        Ok(())
    }

    fn check_transaction(&self, transaction: &Transaction) -> Result<(), BlockchainError> {
        let missing_sender = transaction.is_reward()
            || matches!(&transaction.from_address, Some(from) if from.is_empty());
        if missing_sender || transaction.to_address.is_empty() {
            return Err(BlockchainError::InvalidTransaction(
                "Transaction must include from and to address".to_string(),
            ));
        }

        if !transaction.amount.is_finite() || transaction.amount < 0.0 {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Amount must be a non-negative number, got {}",
                transaction.amount
            )));
        }

        match transaction.verify(&self.crypto) {
            Ok(true) => Ok(()),
            Ok(false) => Err(BlockchainError::InvalidTransaction(
                "Cannot add invalid transaction to chain".to_string(),
            )),
            Err(err) => Err(BlockchainError::InvalidTransaction(err.to_string())),
        }
    }

    /// Mines a new block with the pending transactions plus a reward for
    /// `reward_address`
    ///
    /// Blocks the calling thread until a valid nonce is found.
    pub fn mine_pending_transactions(&self, reward_address: &Address) -> Result<Block, BlockchainError> {
        self.mine_pending(reward_address, None)
    }

    /// Like [`Blockchain::mine_pending_transactions`], but gives up when
    /// `cancel` is raised
    ///
    /// A cancelled run leaves the chain and the pending queue untouched.
    pub fn mine_pending_transactions_until(
        &self,
        reward_address: &Address,
        cancel: &AtomicBool,
    ) -> Result<Block, BlockchainError> {
        self.mine_pending(reward_address, Some(cancel))
    }

    fn mine_pending(&self, reward_address: &Address, cancel: Option<&AtomicBool>) -> Result<Block, BlockchainError> {
        // Only one miner at a time, so the latest block cannot move under us
        let _mining = lock(&self.mining);

        // Snapshot the queue; admissions during the search wait for the next block
        let mut transactions = self.get_pending_transactions();
        let included = transactions.len();
        transactions.push(Transaction::new_reward(reward_address.clone(), self.mining_reward));

        let previous_hash = self.get_latest_block().hash;
        let mut block = Block::new(Utc::now(), transactions, previous_hash);

        match cancel {
            Some(cancel) => {
                if block.mine_until(self.difficulty, cancel) == MiningOutcome::Cancelled {
                    warn!("Mining cancelled after {} attempts", block.nonce);
                    return Err(BlockchainError::MiningCancelled);
                }
            }
            None => block.mine(self.difficulty),
        }

        info!(
            "Block mined: {} (nonce {}, {} transactions)",
            block.hash,
            block.nonce,
            block.transactions.len()
        );

        // Admission only appends, so the snapshot is still the queue's prefix
        let mut pending = lock(&self.pending_transactions);
        lock(&self.chain).push(block.clone());
        pending.drain(..included);

        Ok(block)
    }

    /// Replays the chain to compute the balance of `address`
    ///
    /// Balances are not floored at zero.
    pub fn get_balance_of(&self, address: &Address) -> f64 {
        let chain = lock(&self.chain);
        let mut balance = 0.0;

        for transaction in chain.iter().flat_map(|block| &block.transactions) {
            if transaction.from_address.as_ref() == Some(address) {
                balance -= transaction.amount;
            }

            if &transaction.to_address == address {
                balance += transaction.amount;
            }
        }

        balance
    }

    /// Every chained transaction sent or received by `address`, in chain order
    pub fn get_transactions_of(&self, address: &Address) -> Vec<Transaction> {
        lock(&self.chain)
            .iter()
            .flat_map(|block| &block.transactions)
            .filter(|tx| tx.from_address.as_ref() == Some(address) || &tx.to_address == address)
            .cloned()
            .collect()
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        lock(&self.chain).clone()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        lock(&self.pending_transactions).clone()
    }

    /// Validates every block after genesis, reporting the first failure
    pub fn validate_chain(&self) -> Result<(), BlockchainError> {
        let chain = lock(&self.chain);

        for (index, pair) in chain.windows(2).enumerate() {
            let (previous_block, current_block) = (&pair[0], &pair[1]);
            let index = index + 1;

            if !current_block.has_valid_transactions(&self.crypto) {
                return Err(BlockchainError::InvalidChain {
                    index,
                    reason: "block contains an invalid transaction".to_string(),
                });
            }

            if current_block.hash != current_block.calculate_hash() {
                return Err(BlockchainError::InvalidChain {
                    index,
                    reason: "stored hash does not match block contents".to_string(),
                });
            }

            if current_block.previous_hash != previous_block.hash {
                return Err(BlockchainError::InvalidChain {
                    index,
                    reason: "previous hash does not match preceding block".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Whether every block after genesis passes validation
    pub fn is_chain_valid(&self) -> bool {
        match self.validate_chain() {
            Ok(()) => true,
            Err(err) => {
                warn!("Chain validation failed: {}", err);
                false
            }
        }
    }
}
