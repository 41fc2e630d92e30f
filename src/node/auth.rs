//! Majority-vote self-exclusion after connecting to a peer.
//!
//! The node broadcasts a signed challenge; each connected peer answers with
//! whether the signature checked out. Once every connected peer has answered,
//! a strict majority of rejections makes the node close its own listener.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use super::Node;
use crate::network::{PeerId, Transport};
use crate::protocol::{Identity, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Accepted { declined: usize, total: usize },
    Rejected { declined: usize, total: usize },
}

/// Replies collected for the authorization round in progress.
#[derive(Debug, Default)]
pub struct VerificationRound {
    active: bool,
    results: HashMap<PeerId, bool>,
}

impl VerificationRound {
    /// Start a fresh round; replies from an earlier round are discarded.
    pub fn begin(&mut self) {
        self.results.clear();
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a reply. Returns `false` (and records nothing) outside a round.
    pub fn record(&mut self, peer: PeerId, accepted: bool) -> bool {
        if !self.active {
            return false;
        }
        self.results.insert(peer, accepted);
        true
    }

    pub fn forget(&mut self, peer: &PeerId) {
        self.results.remove(peer);
    }

    /// Decide once every connected peer has replied. A decided round is reset.
    pub fn tally(&mut self, connected: &HashSet<PeerId>) -> Verdict {
        if !self.active {
            return Verdict::Pending;
        }
        let answered = connected.iter().filter(|p| self.results.contains_key(p)).count();
        let total = connected.len();
        if answered < total {
            return Verdict::Pending;
        }

        let declined = connected
            .iter()
            .filter(|p| self.results.get(p) == Some(&false))
            .count();
        self.results.clear();
        self.active = false;

        if declined * 2 > total {
            Verdict::Rejected { declined, total }
        } else {
            Verdict::Accepted { declined, total }
        }
    }
}

impl<T: Transport> Node<T> {
    /// Broadcast our signed identity and open a new tally.
    pub(super) fn request_authorization(&mut self) {
        self.verification.begin();
        let identity = Identity::sign(self.advertised_url.clone(), &self.wallet);
        let sent = self.broadcast(Message::VerificationRequest(identity));
        debug!("AUTH - verification request sent to {sent} peers");
    }

    pub(super) fn on_verification_request(&mut self, peer: PeerId, identity: Identity) {
        let valid = identity.verify();
        debug!("AUTH - {peer} asked to verify {} -> {valid}", identity.message);
        self.send(peer, Message::VerificationResponse(valid));
    }

    pub(super) fn on_verification_response(&mut self, peer: PeerId, accepted: bool) {
        if !self.verification.record(peer, accepted) {
            debug!("AUTH - ignoring reply from {peer}, no round in progress");
            return;
        }
        self.conclude_authorization();
    }

    /// Apply the verdict if the round is complete.
    pub(super) fn conclude_authorization(&mut self) {
        let connected: HashSet<PeerId> = self.peers.keys().copied().collect();
        match self.verification.tally(&connected) {
            Verdict::Pending => {}
            Verdict::Accepted { declined, total } => {
                info!("AUTH - accepted by peers ({declined}/{total} declined)");
            }
            Verdict::Rejected { declined, total } => {
                warn!(
                    "AUTH - closing listener {} due to invalid verification ({declined}/{total} declined)",
                    self.advertised_url
                );
                self.transport.close_listener();
            }
        }
    }
}
