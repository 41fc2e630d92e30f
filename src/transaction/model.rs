use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::timestamp;
use crate::wallet::{Wallet, verify_signature_hex};

/// A signed value transfer between two account addresses.
///
/// Built once through [`Transaction::create`]; the stored `hash` must always
/// match [`Transaction::compute_hash`], and copies (clone, JSON transit)
/// carry hash and signature unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Hex-encoded DER ECDSA signature over `hash`.
    pub signature: String,
    pub hash: String,
}

impl Transaction {
    /// Build a transaction, compute its hash and sign the hash with `signer`.
    /// Admissibility (balance, duplicates) is the ledger's call, not ours.
    pub fn create(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: u64,
        message: impl Into<String>,
        signer: &Wallet,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let mut tx = Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp: timestamp.unwrap_or_else(timestamp::now),
            message: message.into(),
            signature: String::new(),
            hash: String::new(),
        };
        tx.hash = tx.compute_hash();
        tx.signature = signer.sign_digest(tx.hash_bytes());
        tx
    }

    /// SHA-256 over sender, receiver, amount, timestamp and message.
    pub fn compute_hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}",
            self.sender,
            self.receiver,
            self.amount,
            timestamp::format(&self.timestamp),
            self.message
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Check the signature against the signer's public key (hex).
    pub fn verify_signature(&self, pubkey_hex: &str) -> bool {
        verify_signature_hex(pubkey_hex, &self.signature, self.hash_bytes()).unwrap_or(false)
    }

    fn hash_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        if let Ok(bytes) = hex::decode(&self.hash) {
            if bytes.len() == 32 {
                out.copy_from_slice(&bytes);
            }
        }
        out
    }
}
