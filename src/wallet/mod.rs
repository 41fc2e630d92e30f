use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use sha2::{Digest, Sha256};

use crate::error::{NodeError, Result};

/// A node's secp256k1 key pair. Signatures are hex-encoded DER.
#[derive(Debug, Clone)]
pub struct Wallet {
    secret: SecretKey,
    public: PublicKey,
}

impl Wallet {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut OsRng);
        Self { secret, public }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex).map_err(|e| NodeError::Crypto(e.to_string()))?;
        let secret = SecretKey::from_slice(&bytes)?;
        let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret);
        Ok(Self { secret, public })
    }

    /// Uncompressed public key, hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize_uncompressed())
    }

    /// Sign a 32-byte digest.
    pub fn sign_digest(&self, msg32: [u8; 32]) -> String {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(msg32);
        hex::encode(secp.sign_ecdsa(&msg, &self.secret).serialize_der())
    }

    /// Sign arbitrary text by signing its SHA-256 digest.
    pub fn sign_text(&self, text: &str) -> String {
        self.sign_digest(sha256(text.as_bytes()))
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Verify a signature (hex DER) against the given pubkey (hex) and message hash (32 bytes).
pub fn verify_signature_hex(
    pubkey_hex: &str,
    sig_hex: &str,
    msg32: [u8; 32],
) -> std::result::Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| "invalid signature hex")?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| "invalid DER signature")?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid pubkey bytes")?;

    let msg = Message::from_digest(msg32);
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

/// Verify a signature produced by [`Wallet::sign_text`]. Malformed input counts as a failed check.
pub fn verify_text(pubkey_hex: &str, sig_hex: &str, text: &str) -> bool {
    match verify_signature_hex(pubkey_hex, sig_hex, sha256(text.as_bytes())) {
        Ok(valid) => valid,
        Err(reason) => {
            log::debug!("signature check failed: {reason}");
            false
        }
    }
}
