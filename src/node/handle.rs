use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::blockchain::ChainState;
use crate::error::{NodeError, Result, TxRejection};
use crate::miner::JobId;
use crate::transaction::Transaction;

pub type SubmitResult = std::result::Result<Transaction, TxRejection>;

/// The node's own account and verification key.
#[derive(Debug, Clone, Serialize)]
pub struct WalletInfo {
    pub address: String,
    pub public_key: String,
}

/// A transfer requested through the control plane; the node signs it.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub message: String,
}

pub enum ControlRequest {
    ListPeers(oneshot::Sender<Vec<String>>),
    AddPeer(String, oneshot::Sender<()>),
    StartMining(Option<String>, oneshot::Sender<JobId>),
    VerifyIntegrity(oneshot::Sender<bool>),
    Balance(String, oneshot::Sender<i128>),
    SubmitTransaction(TransferRequest, oneshot::Sender<SubmitResult>),
    GetChainState(oneshot::Sender<ChainState>),
    LoadChainState(ChainState, oneshot::Sender<()>),
    Broadcast(String, oneshot::Sender<usize>),
    Wallet(oneshot::Sender<WalletInfo>),
}

async fn receive<Type>(sender: &str, receiver: oneshot::Receiver<Type>) -> Result<Type> {
    receiver
        .await
        .map_err(|error| NodeError::ChannelFailure(sender.to_string(), error.to_string()))
}

/// Cloneable entry point into the node's coordination loop.
#[derive(Clone)]
pub struct NodeHandle {
    command_tx: mpsc::Sender<ControlRequest>,
}

impl NodeHandle {
    pub fn new(command_tx: mpsc::Sender<ControlRequest>) -> Self {
        Self { command_tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    async fn request<Type>(
        &self,
        from: &str,
        build: impl FnOnce(oneshot::Sender<Type>) -> ControlRequest,
    ) -> Result<Type> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(build(tx))
            .await
            .map_err(|error| NodeError::ChannelFailure(from.to_string(), error.to_string()))?;
        receive(from, rx).await
    }

    pub async fn list_peers(&self) -> Result<Vec<String>> {
        self.request("list_peers", ControlRequest::ListPeers).await
    }

    pub async fn add_peer(&self, address: String) -> Result<()> {
        self.request("add_peer", |tx| ControlRequest::AddPeer(address, tx)).await
    }

    /// Kick off a mining round; returns as soon as the worker is started.
    pub async fn start_mining(&self, miner_address: Option<String>) -> Result<JobId> {
        self.request("start_mining", |tx| {
            ControlRequest::StartMining(miner_address, tx)
        })
        .await
    }

    pub async fn verify_integrity(&self) -> Result<bool> {
        self.request("verify_integrity", ControlRequest::VerifyIntegrity).await
    }

    pub async fn balance(&self, address: String) -> Result<i128> {
        self.request("balance", |tx| ControlRequest::Balance(address, tx)).await
    }

    pub async fn submit_transaction(&self, transfer: TransferRequest) -> Result<SubmitResult> {
        self.request("submit_transaction", |tx| {
            ControlRequest::SubmitTransaction(transfer, tx)
        })
        .await
    }

    pub async fn chain_state(&self) -> Result<ChainState> {
        self.request("chain_state", ControlRequest::GetChainState).await
    }

    pub async fn load_chain_state(&self, state: ChainState) -> Result<()> {
        self.request("load_chain_state", |tx| {
            ControlRequest::LoadChainState(state, tx)
        })
        .await
    }

    pub async fn broadcast(&self, text: String) -> Result<usize> {
        self.request("broadcast", |tx| ControlRequest::Broadcast(text, tx)).await
    }

    pub async fn wallet(&self) -> Result<WalletInfo> {
        self.request("wallet", ControlRequest::Wallet).await
    }
}
