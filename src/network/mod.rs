//! Gossip transport: how frames reach other nodes.
//!
//! The node only sees [`NodeEvent`]s and per-peer outboxes; sockets stay here.

pub mod tcp;

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::Message;

pub use tcp::TcpTransport;

/// Stable identifier assigned to each connection when it is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", &self.0.simple().to_string()[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// What the transport reports to the coordination loop.
#[derive(Debug)]
pub enum NodeEvent {
    PeerConnected {
        peer: PeerId,
        address: String,
        outbox: mpsc::UnboundedSender<Message>,
        direction: Direction,
    },
    PeerMessage {
        peer: PeerId,
        message: Message,
    },
    PeerDisconnected {
        peer: PeerId,
    },
}

/// Connection management the node needs from a transport.
pub trait Transport {
    /// Dial `address` (`host:port`). Success shows up later as [`NodeEvent::PeerConnected`];
    /// failure is logged and never propagated.
    fn connect(&self, address: &str);

    /// Stop accepting inbound connections.
    fn close_listener(&self);

    fn is_listening(&self) -> bool;
}
