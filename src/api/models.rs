use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::node::NodeHandle;

/// Shared application state: a handle into the node's coordination loop.
pub struct AppState {
    pub node: NodeHandle,
    /// Where the gossip listener is bound.
    pub p2p_address: SocketAddr,
}

/* ---------- Peer API Models ---------- */

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub address: String,
}

#[derive(Serialize)]
pub struct PeersResponse {
    pub size: usize,
    pub peers: Vec<String>,
}

#[derive(Serialize)]
pub struct P2pResponse {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

#[derive(Deserialize, Default)]
pub struct MineRequest {
    pub miner_address: Option<String>,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub job: u64,
}

/* ---------- TX API Models ---------- */

#[derive(Deserialize)]
pub struct NewTxRequest {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: i128,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
