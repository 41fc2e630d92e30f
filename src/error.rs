use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeError>;

/// Why a transaction was refused admission to the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxRejection {
    #[error("Invalid transaction! Cannot send to yourself")]
    SelfTransfer,
    #[error("Invalid transaction! Cannot add transaction that already exists")]
    Duplicate,
    #[error("Insufficient funds! Cannot add transaction when balance is only {balance}")]
    InsufficientFunds { balance: i128 },
}

/// Why a block does not extend a given tip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockRejection {
    #[error("block hash does not match its contents")]
    HashMismatch,
    #[error("previous hash {found} does not link to tip {expected}")]
    BrokenLink { expected: String, found: String },
    #[error("hash does not meet difficulty {difficulty}")]
    InsufficientWork { difficulty: u32 },
}

/// Failure to apply a proposed replacement suffix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForkError {
    #[error("proposal carries no blocks")]
    EmptyProposal,
    #[error("common ancestor {0} is not part of the local chain")]
    UnknownAncestor(String),
    #[error("proposed block #{position} rejected: {reason}")]
    InvalidBlock {
        position: usize,
        reason: BlockRejection,
    },
}

/// Violations of the sync protocol by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("reached genesis without finding a common ancestor")]
    NoCommonAncestor,
    #[error("ancestor search gave up after {steps} steps")]
    AncestorSearchExhausted { steps: usize },
    #[error("received blocks without an ancestor search in progress")]
    UnsolicitedBlocks,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Channel failure for: {0} - Failure: {1}")]
    ChannelFailure(String, String),
}

impl From<secp256k1::Error> for NodeError {
    fn from(err: secp256k1::Error) -> Self {
        NodeError::Crypto(err.to_string())
    }
}
