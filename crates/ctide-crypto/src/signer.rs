//! # Transaction Signing Capability
//!
//! The ledger client depends on `TransactionSigner`, not on a concrete key
//! type. It is object-safe and `Send + Sync` so one signer can be shared
//! behind an `Arc` by every request.

use std::fmt;

use ctide_core::CanonicalBytes;
use serde::{Deserialize, Serialize};

use crate::ed25519::{self, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

/// Algorithm label carried on Ed25519 signatures.
pub const ED25519_ALGORITHM: &str = "ed25519";

/// One entry of a transaction's `signatures` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedSignature {
    /// Signer public key, lowercase hex.
    pub public_key: String,
    /// Signature over the canonical message, lowercase hex.
    pub signature: String,
    /// Algorithm label, e.g. `ed25519`.
    pub algorithm: String,
}

/// Produces detached signatures over canonical messages.
pub trait TransactionSigner: Send + Sync + fmt::Debug {
    /// Algorithm label written into each signature.
    fn algorithm(&self) -> &'static str;

    /// Public key as lowercase hex.
    fn public_key_hex(&self) -> String;

    /// Sign a canonical message.
    fn sign(&self, message: &CanonicalBytes) -> Result<DetachedSignature, CryptoError>;
}

/// `TransactionSigner` backed by an in-process Ed25519 key.
pub struct Ed25519Signer {
    keypair: Ed25519KeyPair,
}

impl Ed25519Signer {
    pub fn new(keypair: Ed25519KeyPair) -> Self {
        Self { keypair }
    }

    /// Build from a hex seed (the configured signing key).
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, CryptoError> {
        Ed25519KeyPair::from_seed_hex(seed_hex).map(Self::new)
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.keypair.public_key())
            .finish_non_exhaustive()
    }
}

impl TransactionSigner for Ed25519Signer {
    fn algorithm(&self) -> &'static str {
        ED25519_ALGORITHM
    }

    fn public_key_hex(&self) -> String {
        self.keypair.public_key().to_hex()
    }

    fn sign(&self, message: &CanonicalBytes) -> Result<DetachedSignature, CryptoError> {
        Ok(DetachedSignature {
            public_key: self.public_key_hex(),
            signature: self.keypair.sign(message).to_hex(),
            algorithm: ED25519_ALGORITHM.to_string(),
        })
    }
}

/// Check a detached signature against the message it claims to cover.
pub fn verify_detached(
    message: &CanonicalBytes,
    detached: &DetachedSignature,
) -> Result<(), CryptoError> {
    if detached.algorithm != ED25519_ALGORITHM {
        return Err(CryptoError::UnsupportedAlgorithm(detached.algorithm.clone()));
    }
    let pk = Ed25519PublicKey::from_hex(&detached.public_key)?;
    let sig = Ed25519Signature::from_hex(&detached.signature)?;
    ed25519::verify(message, &sig, &pk)
}
