use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

use super::block::meets_difficulty;
use super::{Block, REWARD_MESSAGE, SYSTEM_ADDRESS};
use crate::error::{BlockRejection, ForkError, TxRejection};
use crate::transaction::Transaction;
use crate::wallet::Wallet;

/// Serializable snapshot of a ledger, used for inspection and bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub chain: Vec<Block>,
    pub difficulty: u32,
    pub block_reward: u64,
    pub mempool: Vec<Transaction>,
}

/// In-memory chain from genesis plus the mempool of unconfirmed transactions.
///
/// Invariants: the chain is never empty and starts at [`Block::genesis`];
/// mempool hashes are unique and absent from the committed chain.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    difficulty: u32,
    block_reward: u64,
    mempool: Vec<Transaction>,
}

impl Ledger {
    pub fn new(difficulty: u32, block_reward: u64) -> Self {
        Self {
            chain: vec![Block::genesis()],
            difficulty,
            block_reward,
            mempool: Vec::new(),
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn block_reward(&self) -> u64 {
        self.block_reward
    }

    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Ledger should always have at least the genesis block")
    }

    /// Appends without checks; callers validate with [`Ledger::verify_block`] first.
    pub fn push_block(&mut self, block: Block) {
        self.chain.push(block);
    }

    /// Why `candidate` cannot follow `tip`, if it cannot.
    pub fn check_block(&self, candidate: &Block, tip: &Block) -> Result<(), BlockRejection> {
        if candidate.hash != candidate.generate_verification_hash() {
            return Err(BlockRejection::HashMismatch);
        }
        if candidate.previous_hash != tip.hash {
            return Err(BlockRejection::BrokenLink {
                expected: tip.hash.clone(),
                found: candidate.previous_hash.clone(),
            });
        }
        if !meets_difficulty(&candidate.hash, self.difficulty) {
            return Err(BlockRejection::InsufficientWork {
                difficulty: self.difficulty,
            });
        }
        Ok(())
    }

    pub fn verify_block(&self, candidate: &Block, tip: &Block) -> bool {
        self.check_block(candidate, tip).is_ok()
    }

    /// Audit every stored transaction hash and block hash, in chain order.
    pub fn verify_integrity(&self) -> bool {
        for block in &self.chain {
            if block.transactions.iter().any(|tx| !tx.verify_hash()) {
                return false;
            }
            if block.hash != block.generate_verification_hash() {
                return false;
            }
        }
        true
    }

    pub fn transaction_exists(&self, hash: &str) -> bool {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .any(|tx| tx.hash == hash)
    }

    /// Admit a transaction into the mempool.
    ///
    /// Funds are checked against confirmed balance minus whatever the sender
    /// already has pending in the mempool.
    pub fn add_transaction_with_verification(
        &mut self,
        tx: Transaction,
    ) -> Result<(), TxRejection> {
        if tx.sender == tx.receiver {
            return Err(TxRejection::SelfTransfer);
        }
        if self.transaction_exists(&tx.hash) || self.mempool.iter().any(|t| t.hash == tx.hash) {
            return Err(TxRejection::Duplicate);
        }

        let balance = self.account_balance(&tx.sender);
        let committed = self.commissioned_value(&tx.sender);
        if i128::from(tx.amount) + committed > balance {
            return Err(TxRejection::InsufficientFunds { balance });
        }

        debug!(
            "mempool - admitted {} ({} -> {}, amount={})",
            tx.hash, tx.sender, tx.receiver, tx.amount
        );
        self.mempool.push(tx);
        Ok(())
    }

    /// Confirmed balance: received minus sent over all committed blocks.
    pub fn account_balance(&self, address: &str) -> i128 {
        let mut balance = 0i128;
        for tx in self.chain.iter().flat_map(|b| b.transactions.iter()) {
            if tx.sender == address {
                balance -= i128::from(tx.amount);
            } else if tx.receiver == address {
                balance += i128::from(tx.amount);
            }
        }
        balance
    }

    /// Sum of amounts `address` is sending in pending transactions.
    pub fn commissioned_value(&self, address: &str) -> i128 {
        self.mempool
            .iter()
            .filter(|tx| tx.sender == address)
            .map(|tx| i128::from(tx.amount))
            .sum()
    }

    fn position_of(&self, hash: &str) -> Option<usize> {
        self.chain.iter().position(|b| b.hash == hash)
    }

    pub fn check_if_block_exists(&self, block: &Block) -> bool {
        self.position_of(&block.hash).is_some()
    }

    /// The block before `block`; `None` for genesis or an unknown block.
    pub fn get_previous_block_from(&self, block: &Block) -> Option<&Block> {
        match self.position_of(&block.hash)? {
            0 => None,
            i => self.chain.get(i - 1),
        }
    }

    /// Blocks from `block` (or just after it) to the tip. `None` if `block` is not on our chain.
    pub fn get_subchain_from(&self, block: &Block, include_first: bool) -> Option<Vec<Block>> {
        let index = self.position_of(&block.hash)?;
        let start = if include_first { index } else { index + 1 };
        Some(self.chain[start..].to_vec())
    }

    /// Coarse work weight: transaction count times difficulty, summed.
    pub fn calculate_proof_of_work(&self, blocks: &[Block]) -> u64 {
        blocks
            .iter()
            .map(|b| b.transactions.len() as u64 * u64::from(self.difficulty))
            .sum()
    }

    /// Replace everything after a common ancestor with `proposal[1..]`.
    ///
    /// `proposal[0]` is the ancestor and must be on our chain. Every proposed
    /// block is checked against its proposed predecessor before anything is
    /// touched; one bad block leaves the chain as it was. Returns how many
    /// blocks were applied.
    pub fn adjust_and_verify_blockchain(
        &mut self,
        proposal: Vec<Block>,
    ) -> Result<usize, ForkError> {
        let mut blocks = proposal.into_iter();
        let ancestor = blocks.next().ok_or(ForkError::EmptyProposal)?;
        let index = self
            .position_of(&ancestor.hash)
            .ok_or_else(|| ForkError::UnknownAncestor(ancestor.hash.clone()))?;
        let replacement: Vec<Block> = blocks.collect();
        if replacement.is_empty() {
            return Err(ForkError::EmptyProposal);
        }

        let mut previous = &self.chain[index];
        for (position, block) in replacement.iter().enumerate() {
            self.check_block(block, previous)
                .map_err(|reason| ForkError::InvalidBlock { position, reason })?;
            previous = block;
        }

        let applied = replacement.len();
        self.chain.truncate(index + 1);
        self.chain.extend(replacement);
        Ok(applied)
    }

    /// Transactions for a new mining round: the pending set plus the reward.
    pub fn work_order_transactions(
        &self,
        miner_address: &str,
        signer: &Wallet,
    ) -> Vec<Transaction> {
        let reward = Transaction::create(
            SYSTEM_ADDRESS,
            miner_address,
            self.block_reward,
            REWARD_MESSAGE,
            signer,
            None,
        );
        let mut txs = self.mempool.clone();
        txs.push(reward);
        txs
    }

    /// Drop pending transactions that are now committed. Returns how many were removed.
    pub fn prune_mempool(&mut self) -> usize {
        let committed: HashSet<&str> = self
            .chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .map(|tx| tx.hash.as_str())
            .collect();
        let before = self.mempool.len();
        self.mempool.retain(|tx| !committed.contains(tx.hash.as_str()));
        before - self.mempool.len()
    }

    pub fn state(&self) -> ChainState {
        ChainState {
            chain: self.chain.clone(),
            difficulty: self.difficulty,
            block_reward: self.block_reward,
            mempool: self.mempool.clone(),
        }
    }

    /// Replace the whole in-memory state. An empty chain falls back to genesis alone.
    pub fn load_state(&mut self, state: ChainState) {
        self.chain = if state.chain.is_empty() {
            vec![Block::genesis()]
        } else {
            state.chain
        };
        self.difficulty = state.difficulty;
        self.block_reward = state.block_reward;
        self.mempool = state.mempool;
    }
}
