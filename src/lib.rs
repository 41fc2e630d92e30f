//! A peer-to-peer proof-of-work ledger node.
//!
//! [`node::Node`] owns the chain and talks to peers through a
//! [`network::Transport`]; [`api`] serves the HTTP control plane over a
//! [`node::NodeHandle`].

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod miner;
pub mod network;
pub mod node;
pub mod protocol;
pub mod timestamp;
pub mod transaction;
pub mod wallet;
