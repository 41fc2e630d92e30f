//! Background proof-of-work search.
//!
//! One work order at a time: starting a new order cancels the one in flight,
//! and a result is only accepted from the job that is currently active. The
//! worker never touches the ledger; it only reports the sealed block.

use log::{debug, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::blockchain::Block;
use crate::transaction::Transaction;

pub type JobId = u64;

/// Everything a worker needs to build and seal a block.
#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub difficulty: u32,
}

/// A block sealed by the worker for job `job`.
#[derive(Debug)]
pub struct MinedBlock {
    pub job: JobId,
    pub block: Block,
}

#[derive(Debug)]
struct ActiveJob {
    id: JobId,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct Miner {
    next_id: JobId,
    active: Option<ActiveJob>,
    results: mpsc::UnboundedSender<MinedBlock>,
}

impl Miner {
    pub fn new(results: mpsc::UnboundedSender<MinedBlock>) -> Self {
        Self {
            next_id: 0,
            active: None,
            results,
        }
    }

    pub fn is_mining(&self) -> bool {
        self.active.is_some()
    }

    /// Start a worker for `order`, superseding any job in flight.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, order: WorkOrder) -> JobId {
        self.cancel();

        self.next_id += 1;
        let id = self.next_id;
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let results = self.results.clone();

        info!(
            "MINER - job {} started ({} txs, difficulty {})",
            id,
            order.transactions.len(),
            order.difficulty
        );

        tokio::task::spawn_blocking(move || {
            let mut block = Block::new(order.transactions, order.previous_hash);
            if !block.mine_cancellable(order.difficulty, &worker_cancel)
                || worker_cancel.is_cancelled()
            {
                debug!("MINER - job {} aborted", id);
                return;
            }
            debug!("MINER - job {} found nonce {} (hash={})", id, block.nonce, block.hash);
            if results.send(MinedBlock { job: id, block }).is_err() {
                debug!("MINER - job {} finished after the node went away", id);
            }
        });

        self.active = Some(ActiveJob { id, cancel });
        id
    }

    /// Abort the job in flight, if any. Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some(job) => {
                job.cancel.cancel();
                info!("MINER - job {} cancelled", job.id);
                true
            }
            None => false,
        }
    }

    /// Hand back the block if `result` belongs to the active job; stale results are dropped.
    pub fn complete(&mut self, result: MinedBlock) -> Option<Block> {
        match &self.active {
            Some(job) if job.id == result.job => {
                self.active = None;
                Some(result.block)
            }
            _ => {
                debug!("MINER - dropping stale result from job {}", result.job);
                None
            }
        }
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        if let Some(job) = self.active.take() {
            job.cancel.cancel();
        }
    }
}
