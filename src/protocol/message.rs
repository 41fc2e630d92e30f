use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::error::Result;
use crate::transaction::Transaction;
use crate::wallet::{Wallet, verify_text};

/// Signed challenge a node broadcasts to prove it owns its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub message: String,
    pub signature: String,
    pub public_key: String,
}

impl Identity {
    pub fn sign(message: impl Into<String>, wallet: &Wallet) -> Self {
        let message = message.into();
        Self {
            signature: wallet.sign_text(&message),
            public_key: wallet.public_key_hex(),
            message,
        }
    }

    pub fn verify(&self) -> bool {
        verify_text(&self.public_key, &self.signature, &self.message)
    }
}

/// Every gossip frame exchanged between nodes.
///
/// On the wire: `{"type": "BLOCK_MINED", "data": {...}}`, one JSON document per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    LogInformation(String),
    VerificationRequest(Identity),
    VerificationResponse(bool),
    BlockMined(Block),
    TransactionAdded(Transaction),
    CheckIfBlockExists(Block),
    InsertLackingBlocks(Vec<Block>),
    BlockNotFound(Block),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::LogInformation(_) => "LOG_INFORMATION",
            Message::VerificationRequest(_) => "VERIFICATION_REQUEST",
            Message::VerificationResponse(_) => "VERIFICATION_RESPONSE",
            Message::BlockMined(_) => "BLOCK_MINED",
            Message::TransactionAdded(_) => "TRANSACTION_ADDED",
            Message::CheckIfBlockExists(_) => "CHECK_IF_BLOCK_EXISTS",
            Message::InsertLackingBlocks(_) => "INSERT_LACKING_BLOCKS",
            Message::BlockNotFound(_) => "BLOCK_NOT_FOUND",
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}
