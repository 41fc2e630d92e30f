//! Fork reconciliation between two nodes.
//!
//! A peer block that does not link to our tip starts a backward search for
//! the deepest block both chains share. The peer then ships everything it
//! has from that block on, and the heavier suffix wins.

use log::{debug, info, warn};

use super::Node;
use crate::blockchain::Block;
use crate::error::{BlockRejection, ProtocolError};
use crate::network::{PeerId, Transport};
use crate::protocol::Message;

/// Equal weight favors the incoming proposal.
pub const TIES_FAVOR_INCOMING: bool = true;

pub fn incoming_wins(incoming: u64, local: u64) -> bool {
    incoming > local || (incoming == local && TIES_FAVOR_INCOMING)
}

/// Progress of a backward ancestor search with one peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct AncestorSearch {
    pub steps: usize,
}

impl<T: Transport> Node<T> {
    /// A block announced by a peer: append it, or start reconciling.
    pub(super) fn on_peer_block(&mut self, peer: PeerId, block: Block) {
        if self.ledger.check_if_block_exists(&block) {
            debug!("SYNC - {peer} announced {} which we already have", block.hash);
            return;
        }

        match self.ledger.check_block(&block, self.ledger.last_block()) {
            Ok(()) => {
                info!("SYNC - appending block {} from {peer}", block.hash);
                self.ledger.push_block(block);
                self.after_chain_change();
            }
            Err(BlockRejection::BrokenLink { .. }) => self.begin_ancestor_search(peer),
            Err(reason) => warn!("SYNC - rejected block {} from {peer}: {reason}", block.hash),
        }
    }

    fn begin_ancestor_search(&mut self, peer: PeerId) {
        if self.ancestor_searches.contains_key(&peer) {
            debug!("SYNC - ancestor search with {peer} already running");
            return;
        }
        let chain = self.ledger.chain();
        let candidate = chain[chain.len().saturating_sub(2)].clone();
        debug!("SYNC - asking {peer} for ancestor {}", candidate.hash);
        self.ancestor_searches.insert(peer, AncestorSearch::default());
        self.send(peer, Message::CheckIfBlockExists(candidate));
    }

    pub(super) fn on_check_if_block_exists(&mut self, peer: PeerId, block: Block) {
        let reply = match self.ledger.get_subchain_from(&block, true) {
            Some(subchain) => {
                debug!("SYNC - sending {} blocks from {} to {peer}", subchain.len(), block.hash);
                Message::InsertLackingBlocks(subchain)
            }
            None => Message::BlockNotFound(block),
        };
        self.send(peer, reply);
    }

    /// The peer lacks `block`; try its predecessor. Bounded by our chain length.
    pub(super) fn on_block_not_found(
        &mut self,
        peer: PeerId,
        block: Block,
    ) -> Result<(), ProtocolError> {
        let limit = self.ledger.len();
        let Some(search) = self.ancestor_searches.get_mut(&peer) else {
            debug!("SYNC - ignoring BLOCK_NOT_FOUND from {peer}, no search in progress");
            return Ok(());
        };
        search.steps += 1;
        let steps = search.steps;

        if steps >= limit {
            self.ancestor_searches.remove(&peer);
            return Err(ProtocolError::AncestorSearchExhausted { steps });
        }
        let Some(previous) = self.ledger.get_previous_block_from(&block).cloned() else {
            self.ancestor_searches.remove(&peer);
            return Err(ProtocolError::NoCommonAncestor);
        };

        debug!("SYNC - step {steps}: asking {peer} for {}", previous.hash);
        self.send(peer, Message::CheckIfBlockExists(previous));
        Ok(())
    }

    /// The peer's suffix from our common ancestor: adopt it if it is at least as heavy.
    pub(super) fn on_insert_lacking_blocks(
        &mut self,
        peer: PeerId,
        blocks: Vec<Block>,
    ) -> Result<(), ProtocolError> {
        if self.ancestor_searches.remove(&peer).is_none() {
            return Err(ProtocolError::UnsolicitedBlocks);
        }
        let Some(ancestor) = blocks.first() else {
            warn!("SYNC - {peer} sent an empty block list");
            return Ok(());
        };
        let Some(own) = self.ledger.get_subchain_from(ancestor, false) else {
            return Err(ProtocolError::NoCommonAncestor);
        };

        let proposed = &blocks[1..];
        if proposed == own.as_slice() {
            debug!("SYNC - {peer} has nothing we lack");
            return Ok(());
        }

        let incoming = self.ledger.calculate_proof_of_work(proposed);
        let local = self.ledger.calculate_proof_of_work(&own);
        if !incoming_wins(incoming, local) {
            info!("SYNC - keeping local suffix (local work {local} > incoming {incoming} from {peer})");
            return Ok(());
        }

        match self.ledger.adjust_and_verify_blockchain(blocks) {
            Ok(applied) => {
                info!(
                    "SYNC - adopted {applied} blocks from {peer} (work {incoming} vs {local}), tip {}",
                    self.ledger.last_block().hash
                );
                self.after_chain_change();
            }
            Err(e) => warn!("SYNC - proposal from {peer} discarded: {e}"),
        }
        Ok(())
    }
}
