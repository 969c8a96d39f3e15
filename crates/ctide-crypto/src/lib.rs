//! # ctide-crypto: Signing and Proofs
//!
//! - [`ed25519`]: key pairs, signatures and verification over `CanonicalBytes`.
//! - [`signer`]: the `TransactionSigner` capability the ledger client consumes.
//! - [`merkle`]: self-consistency proof generation and verification.
//!
//! Private key material never implements `Serialize` and its `Debug` output
//! is redacted.

pub mod ed25519;
pub mod error;
pub mod merkle;
pub mod signer;

pub use ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use error::CryptoError;
pub use merkle::{
    self_consistency_proof, verify_proof, verify_proof_for, MerkleProof, ProofSource,
    DEFAULT_MERKLE_DEPTH,
};
pub use signer::{verify_detached, DetachedSignature, Ed25519Signer, TransactionSigner};
