//! # Merkle Proofs
//!
//! Two kinds of proof share one shape:
//!
//! - **Self-consistency proofs** are computed locally when the ledger cannot
//!   supply one. Starting from `leaf = H(consent_id)`, each level appends
//!   `sibling_i = H(current ‖ i)` to the path and folds
//!   `current = H(current ‖ sibling_i)`. The final `current` is the root.
//!   Verification replays the fold. Such a proof shows only that the holder
//!   can reproduce the chain for this id; it says nothing about whether the
//!   consent was ever included in a ledger block.
//!
//! - **Ledger-attested proofs** are fetched from the ledger node. Their path
//!   follows the ledger's own tree, so `verified` reflects the ledger's
//!   attestation rather than a local replay.
//!
//! [`ProofSource`] travels with every proof so callers can tell them apart.

use ctide_core::derive::hash_str;
use ctide_core::ConsentId;
use serde::{Deserialize, Serialize};

/// Default number of levels in a self-consistency proof.
pub const DEFAULT_MERKLE_DEPTH: usize = 16;

/// Where a proof came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofSource {
    /// Locally reproduced hash chain; not evidence of ledger inclusion.
    SelfConsistency,
    /// Supplied and attested by the ledger node.
    LedgerAttested,
}

impl std::fmt::Display for ProofSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SelfConsistency => "self_consistency",
            Self::LedgerAttested => "ledger_attested",
        })
    }
}

/// An inclusion-style proof: leaf, ordered sibling path, root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub root: String,
    /// Sibling hashes from leaf to root.
    pub path: Vec<String>,
    pub leaf: String,
    pub verified: bool,
    pub source: ProofSource,
}

/// Build the self-consistency proof for `consent_id` with `depth` levels.
pub fn self_consistency_proof(consent_id: &ConsentId, depth: usize) -> MerkleProof {
    let leaf = hash_str(consent_id.as_str());
    let mut current = leaf.clone();
    let mut path = Vec::with_capacity(depth);
    for i in 0..depth {
        let sibling = sibling_at(&current, i);
        current = fold(&current, &sibling);
        path.push(sibling);
    }
    MerkleProof {
        root: current,
        path,
        leaf,
        verified: true,
        source: ProofSource::SelfConsistency,
    }
}

/// Verify a proof.
///
/// Self-consistency proofs are replayed: every sibling must equal
/// `H(current ‖ i)` and the fold must end at `root`, so a change to any byte
/// of `leaf`, `path` or `root` fails. Ledger-attested proofs cannot be
/// replayed locally; they pass when the ledger marked them verified and the
/// proof is well formed.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    match proof.source {
        ProofSource::SelfConsistency => replay(&proof.leaf, &proof.path)
            .map(|root| root == proof.root)
            .unwrap_or(false),
        ProofSource::LedgerAttested => proof.verified && !proof.root.is_empty(),
    }
}

/// [`verify_proof`] plus a check that a self-consistency proof's leaf belongs
/// to `consent_id`.
pub fn verify_proof_for(consent_id: &ConsentId, proof: &MerkleProof) -> bool {
    if proof.source == ProofSource::SelfConsistency && proof.leaf != hash_str(consent_id.as_str())
    {
        return false;
    }
    verify_proof(proof)
}

fn replay(leaf: &str, path: &[String]) -> Option<String> {
    let mut current = leaf.to_string();
    for (i, sibling) in path.iter().enumerate() {
        if *sibling != sibling_at(&current, i) {
            return None;
        }
        current = fold(&current, sibling);
    }
    Some(current)
}

fn sibling_at(current: &str, level: usize) -> String {
    hash_str(&format!("{current}{level}"))
}

fn fold(current: &str, sibling: &str) -> String {
    hash_str(&format!("{current}{sibling}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ConsentId {
        ConsentId::parse("00112233445566778899aabbccddeeff").unwrap()
    }

    #[test]
    fn proof_has_requested_depth() {
        let proof = self_consistency_proof(&id(), DEFAULT_MERKLE_DEPTH);
        assert_eq!(proof.path.len(), 16);
        assert_eq!(proof.leaf, hash_str(id().as_str()));
        assert!(proof.verified);
        assert_eq!(proof.source, ProofSource::SelfConsistency);
    }

    #[test]
    fn proof_is_reproducible() {
        assert_eq!(
            self_consistency_proof(&id(), 8),
            self_consistency_proof(&id(), 8)
        );
    }

    #[test]
    fn round_trip_verifies() {
        let proof = self_consistency_proof(&id(), DEFAULT_MERKLE_DEPTH);
        assert!(verify_proof(&proof));
        assert!(verify_proof_for(&id(), &proof));
    }

    #[test]
    fn zero_depth_root_is_leaf() {
        let proof = self_consistency_proof(&id(), 0);
        assert_eq!(proof.root, proof.leaf);
        assert!(verify_proof(&proof));
    }

    #[test]
    fn tampered_root_fails() {
        let mut proof = self_consistency_proof(&id(), 4);
        proof.root = hash_str("forged");
        assert!(!verify_proof(&proof));
    }

    #[test]
    fn reordered_path_fails() {
        let mut proof = self_consistency_proof(&id(), 4);
        proof.path.swap(0, 1);
        assert!(!verify_proof(&proof));
    }

    #[test]
    fn truncated_path_fails() {
        let mut proof = self_consistency_proof(&id(), 4);
        proof.path.pop();
        assert!(!verify_proof(&proof));
    }

    #[test]
    fn proof_for_other_id_rejected() {
        let other = ConsentId::parse("ffeeddccbbaa99887766554433221100").unwrap();
        let proof = self_consistency_proof(&other, 4);
        assert!(verify_proof(&proof));
        assert!(!verify_proof_for(&id(), &proof));
    }

    #[test]
    fn ledger_attested_trusts_flag() {
        let mut proof = MerkleProof {
            root: "r".into(),
            path: vec!["x".into()],
            leaf: "l".into(),
            verified: true,
            source: ProofSource::LedgerAttested,
        };
        assert!(verify_proof(&proof));
        proof.verified = false;
        assert!(!verify_proof(&proof));
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let json = serde_json::to_value(self_consistency_proof(&id(), 1)).unwrap();
        assert_eq!(json["source"], "self_consistency");
        assert!(json["path"].is_array());
        assert_eq!(json["verified"], true);
    }
}
