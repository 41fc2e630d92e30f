//! The coordination context.
//!
//! One task owns the [`Ledger`], the peer set and the miner, and handles
//! control requests, gossip frames and mined blocks one at a time. Nothing
//! else mutates chain or mempool, so no locks are involved.

pub mod auth;
pub mod handle;
pub mod sync;

use std::collections::HashMap;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::blockchain::Ledger;
use crate::config::NodeConfig;
use crate::miner::{JobId, MinedBlock, Miner, WorkOrder};
use crate::network::{Direction, NodeEvent, PeerId, Transport};
use crate::protocol::Message;
use crate::transaction::Transaction;
use crate::wallet::Wallet;

use auth::VerificationRound;
pub use handle::{ControlRequest, NodeHandle, SubmitResult, TransferRequest, WalletInfo};
use sync::AncestorSearch;

/// A connected peer: its remote address and the queue its writer drains.
#[derive(Debug)]
pub struct Peer {
    pub address: String,
    outbox: mpsc::UnboundedSender<Message>,
}

pub struct Node<T: Transport> {
    mail_address: String,
    advertised_url: String,
    wallet: Wallet,
    ledger: Ledger,
    transport: T,
    peers: HashMap<PeerId, Peer>,
    miner: Miner,
    mined_rx: mpsc::UnboundedReceiver<MinedBlock>,
    verification: VerificationRound,
    ancestor_searches: HashMap<PeerId, AncestorSearch>,
}

impl<T: Transport> Node<T> {
    pub fn new(config: &NodeConfig, wallet: Wallet, transport: T) -> Self {
        let (mined_tx, mined_rx) = mpsc::unbounded_channel();
        Self {
            mail_address: config.mail_address.clone(),
            advertised_url: config.advertised_url(),
            wallet,
            ledger: Ledger::new(config.difficulty, config.block_reward),
            transport,
            peers: HashMap::new(),
            miner: Miner::new(mined_tx),
            mined_rx,
            verification: VerificationRound::default(),
            ancestor_searches: HashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_mining(&self) -> bool {
        self.miner.is_mining()
    }

    /// Remote addresses of connected peers.
    pub fn peer_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.peers.values().map(|p| p.address.clone()).collect();
        addresses.sort();
        addresses
    }

    pub fn connect(&self, address: &str) {
        info!("NODE - dialing {address}");
        self.transport.connect(address);
    }

    /// Serve events, control requests and mined blocks until every handle is dropped.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<NodeEvent>,
        mut control: mpsc::Receiver<ControlRequest>,
    ) {
        info!("NODE - coordination loop started for {}", self.mail_address);
        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event),
                request = control.recv() => match request {
                    Some(request) => self.handle_control(request),
                    None => break,
                },
                Some(result) = self.mined_rx.recv() => self.on_block_mined(result),
            }
        }
        self.miner.cancel();
        info!("NODE - coordination loop stopped");
    }

    pub fn handle_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::PeerConnected {
                peer,
                address,
                outbox,
                direction,
            } => self.on_peer_connected(peer, address, outbox, direction),
            NodeEvent::PeerMessage { peer, message } => self.handle_message(peer, message),
            NodeEvent::PeerDisconnected { peer } => self.remove_peer(peer),
        }
    }

    pub fn handle_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::ListPeers(reply) => {
                let _ = reply.send(self.peer_addresses());
            }
            ControlRequest::AddPeer(address, reply) => {
                self.connect(&address);
                let _ = reply.send(());
            }
            ControlRequest::StartMining(miner_address, reply) => {
                let _ = reply.send(self.start_mining(miner_address));
            }
            ControlRequest::VerifyIntegrity(reply) => {
                let _ = reply.send(self.ledger.verify_integrity());
            }
            ControlRequest::Balance(address, reply) => {
                let _ = reply.send(self.ledger.account_balance(&address));
            }
            ControlRequest::SubmitTransaction(transfer, reply) => {
                let _ = reply.send(self.submit_transaction(transfer));
            }
            ControlRequest::GetChainState(reply) => {
                let _ = reply.send(self.ledger.state());
            }
            ControlRequest::LoadChainState(state, reply) => {
                self.miner.cancel();
                self.ancestor_searches.clear();
                self.ledger.load_state(state);
                info!("NODE - state replaced, height {}", self.ledger.len());
                let _ = reply.send(());
            }
            ControlRequest::Broadcast(text, reply) => {
                let _ = reply.send(self.broadcast(Message::LogInformation(text)));
            }
            ControlRequest::Wallet(reply) => {
                let _ = reply.send(WalletInfo {
                    address: self.mail_address.clone(),
                    public_key: self.wallet.public_key_hex(),
                });
            }
        }
    }

    pub fn handle_message(&mut self, peer: PeerId, message: Message) {
        if !self.peers.contains_key(&peer) {
            debug!("NODE - dropping {} from unknown {peer}", message.kind());
            return;
        }
        debug!("NODE - {} from {peer}", message.kind());

        let outcome = match message {
            Message::LogInformation(text) => {
                info!("{peer}: {text}");
                Ok(())
            }
            Message::VerificationRequest(identity) => {
                self.on_verification_request(peer, identity);
                Ok(())
            }
            Message::VerificationResponse(accepted) => {
                self.on_verification_response(peer, accepted);
                Ok(())
            }
            Message::BlockMined(block) => {
                self.on_peer_block(peer, block);
                Ok(())
            }
            Message::TransactionAdded(tx) => {
                self.on_peer_transaction(peer, tx);
                Ok(())
            }
            Message::CheckIfBlockExists(block) => {
                self.on_check_if_block_exists(peer, block);
                Ok(())
            }
            Message::InsertLackingBlocks(blocks) => self.on_insert_lacking_blocks(peer, blocks),
            Message::BlockNotFound(block) => self.on_block_not_found(peer, block),
        };

        if let Err(e) = outcome {
            error!("SYNC - protocol violation by {peer}: {e}");
        }
    }

    /// Build a work order from the mempool plus our reward and hand it to the miner.
    pub fn start_mining(&mut self, miner_address: Option<String>) -> JobId {
        let miner_address = miner_address.unwrap_or_else(|| self.mail_address.clone());
        let order = WorkOrder {
            transactions: self
                .ledger
                .work_order_transactions(&miner_address, &self.wallet),
            previous_hash: self.ledger.last_block().hash.clone(),
            difficulty: self.ledger.difficulty(),
        };
        self.miner.start(order)
    }

    /// A worker finished: apply the block if it still extends our tip, then announce it.
    pub fn on_block_mined(&mut self, result: MinedBlock) {
        let Some(block) = self.miner.complete(result) else {
            return;
        };
        if let Err(reason) = self.ledger.check_block(&block, self.ledger.last_block()) {
            warn!("MINER - discarding mined block {}: {reason}", block.hash);
            return;
        }
        info!(
            "MINER - sealed block #{} (hash={}, nonce={})",
            self.ledger.len(),
            block.hash,
            block.nonce
        );
        self.ledger.push_block(block.clone());
        self.after_chain_change();
        self.broadcast(Message::BlockMined(block));
    }

    fn submit_transaction(&mut self, transfer: TransferRequest) -> SubmitResult {
        let tx = Transaction::create(
            transfer.sender,
            transfer.receiver,
            transfer.amount,
            transfer.message,
            &self.wallet,
            None,
        );
        if let Err(reason) = self.ledger.add_transaction_with_verification(tx.clone()) {
            warn!("TX - rejected {}: {reason}", tx.hash);
            return Err(reason);
        }
        info!("TX - {} accepted into mempool", tx.hash);
        self.broadcast(Message::TransactionAdded(tx.clone()));
        Ok(tx)
    }

    fn on_peer_transaction(&mut self, peer: PeerId, tx: Transaction) {
        if !tx.verify_hash() {
            warn!("TX - {peer} sent {} with a hash that does not match", tx.hash);
            return;
        }
        let hash = tx.hash.clone();
        match self.ledger.add_transaction_with_verification(tx) {
            Ok(()) => info!("TX - {hash} from {peer} accepted into mempool"),
            Err(reason) => debug!("TX - {hash} from {peer} rejected: {reason}"),
        }
    }

    /// Tip moved: settle the mempool and stop mining on the old tip.
    fn after_chain_change(&mut self) {
        let pruned = self.ledger.prune_mempool();
        if pruned > 0 {
            debug!("NODE - pruned {pruned} committed transactions from mempool");
        }
        self.miner.cancel();
    }

    fn on_peer_connected(
        &mut self,
        peer: PeerId,
        address: String,
        outbox: mpsc::UnboundedSender<Message>,
        direction: Direction,
    ) {
        if self.peers.values().any(|p| p.address == address) {
            debug!("NODE - already connected to {address}, dropping duplicate {peer}");
            return;
        }
        info!("NODE - {peer} connected ({address}, {direction:?})");
        self.peers.insert(peer, Peer { address, outbox });
        self.send(
            peer,
            Message::LogInformation(format!("Initialized connection from {}", self.advertised_url)),
        );
        if direction == Direction::Outbound {
            self.request_authorization();
        }
    }

    /// Forget a peer. Safe to call repeatedly; only the first call has effect.
    fn remove_peer(&mut self, peer: PeerId) {
        let Some(removed) = self.peers.remove(&peer) else {
            return;
        };
        warn!("NODE - connection to {} ({peer}) closed", removed.address);
        self.ancestor_searches.remove(&peer);
        self.verification.forget(&peer);
        self.conclude_authorization();
    }

    fn send(&mut self, peer: PeerId, message: Message) {
        let delivered = match self.peers.get(&peer) {
            Some(p) => p.outbox.send(message).is_ok(),
            None => return,
        };
        if !delivered {
            self.remove_peer(peer);
        }
    }

    /// Send to every connected peer. Returns how many accepted the frame.
    fn broadcast(&mut self, message: Message) -> usize {
        let mut failed = Vec::new();
        for (id, peer) in &self.peers {
            if peer.outbox.send(message.clone()).is_err() {
                failed.push(*id);
            }
        }
        let delivered = self.peers.len() - failed.len();
        for id in failed {
            self.remove_peer(id);
        }
        delivered
    }
}

#[cfg(test)]
mod tests;
