use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::timestamp;
use crate::transaction::Transaction;

const GENESIS_TIMESTAMP: &str = "1335-11-19T15:00:00Z";

/// How many nonces to try between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 256;

static GENESIS: OnceLock<Block> = OnceLock::new();

/// A batch of transactions linked to its predecessor by `previous_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: String,
    /// Empty only for genesis.
    pub previous_hash: String,
}

impl Block {
    /// The genesis block every node starts from. Its hash is computed once per process.
    pub fn genesis() -> Self {
        GENESIS
            .get_or_init(|| {
                let ts = timestamp::parse(GENESIS_TIMESTAMP).expect("genesis timestamp is valid");
                let mut block = Self::with_timestamp(Vec::new(), String::new(), ts);
                block.hash = block.generate_verification_hash();
                block
            })
            .clone()
    }

    /// Create a new block (not mined yet). Call `mine()` to perform PoW.
    pub fn new(transactions: Vec<Transaction>, previous_hash: String) -> Self {
        Self::with_timestamp(transactions, previous_hash, timestamp::now())
    }

    pub fn with_timestamp(
        transactions: Vec<Transaction>,
        previous_hash: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            transactions,
            nonce: 0,
            hash: String::new(),
            previous_hash,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_empty()
    }

    /// Canonical JSON of the transaction list, as fed into the block hash.
    pub fn serialize_transactions(&self) -> String {
        serde_json::to_string(&self.transactions).expect("serialize txs")
    }

    /// SHA-256 over previous hash, serialized transactions, timestamp and nonce.
    pub fn generate_hash(&self, serialized_transactions: &str) -> String {
        let preimage = format!(
            "{}{}{}{}",
            self.previous_hash,
            serialized_transactions,
            timestamp::format(&self.timestamp),
            self.nonce
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute the hash from the in-memory transactions, ignoring the stored `hash`.
    pub fn generate_verification_hash(&self) -> String {
        self.generate_hash(&self.serialize_transactions())
    }

    /// Search nonces until the hash has `difficulty` leading zero hex digits.
    ///
    /// Unbounded: if the target is unreachable this never returns. Background
    /// mining goes through [`Block::mine_cancellable`] instead.
    pub fn mine(&mut self, difficulty: u32) {
        let txs = self.serialize_transactions();
        self.hash = self.generate_hash(&txs);
        while !meets_difficulty(&self.hash, difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.generate_hash(&txs);
        }
    }

    /// Like [`Block::mine`], but gives up once `cancel` fires.
    /// Returns `true` if a valid nonce was found.
    pub fn mine_cancellable(&mut self, difficulty: u32, cancel: &CancellationToken) -> bool {
        let txs = self.serialize_transactions();
        self.hash = self.generate_hash(&txs);
        while !meets_difficulty(&self.hash, difficulty) {
            if self.nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return false;
            }
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.generate_hash(&txs);
        }
        true
    }

    /// Stored hash matches content and satisfies the difficulty.
    /// (Does NOT validate chain linkage.)
    pub fn is_valid(&self, difficulty: u32) -> bool {
        self.hash == self.generate_verification_hash() && meets_difficulty(&self.hash, difficulty)
    }
}

pub fn leading_zero_hex_digits(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_hex_digits(hash) >= difficulty as usize
}
