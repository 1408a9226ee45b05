use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use std::sync::atomic::{AtomicBool, Ordering};

use super::crypto::CryptoContext;
use super::transaction::Transaction;

/// Previous-hash value of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// How often the proof-of-work loop checks its cancellation flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Result of a proof-of-work search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningOutcome {
    Mined,
    Cancelled,
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct Block {
    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Hash of the current block
    pub hash: String,

    /// Proof of work
    pub nonce: u64,
}

impl Block {
    /// Creates a new block with nonce 0 and its hash already computed
    pub fn new(timestamp: DateTime<Utc>, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Block {
            timestamp,
            transactions,
            previous_hash,
            hash: String::new(),
            nonce: 0,
        };

        block.hash = block.calculate_hash();
        block
    }

    /// Calculates the hash of the block
    ///
    /// Covers the previous hash, the timestamp, every transaction (in order,
    /// signature included) and the nonce.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        let transactions: Vec<Value> = self
            .transactions
            .iter()
            .map(|tx| {
                json!({
                    "fields": tx.digest_fields(),
                    "signature": tx.signature.as_ref().map(|sig| sig.0.as_str()),
                })
            })
            .collect();

        let block_data = json!({
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            "transactions": transactions,
            "nonce": self.nonce,
        });

        hasher.update(block_data.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Whether the stored hash starts with `difficulty` zero characters
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.hash.len() >= difficulty && self.hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Runs the proof-of-work search to completion
    pub fn mine(&mut self, difficulty: usize) {
        let never = AtomicBool::new(false);
        self.mine_until(difficulty, &never);
    }

    /// Runs the proof-of-work search until a valid nonce is found or `cancel`
    /// is raised
    ///
    /// On cancellation the block keeps the last nonce tried and a hash that
    /// matches it, so it stays internally consistent.
    pub fn mine_until(&mut self, difficulty: usize, cancel: &AtomicBool) -> MiningOutcome {
        while !self.meets_difficulty(difficulty) {
            if self.nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                debug!("Mining cancelled at nonce {}", self.nonce);
                return MiningOutcome::Cancelled;
            }

            self.nonce += 1;
            self.hash = self.calculate_hash();
        }

        MiningOutcome::Mined
    }

    /// Checks every transaction, stopping at the first invalid one
    ///
    /// A transaction whose verification errors counts as invalid.
    pub fn has_valid_transactions(&self, ctx: &CryptoContext) -> bool {
        self.transactions.iter().all(|tx| match tx.verify(ctx) {
            Ok(valid) => valid,
            Err(err) => {
                debug!("Transaction {} failed verification: {}", tx.calculate_hash(), err);
                false
            }
        })
    }
}
