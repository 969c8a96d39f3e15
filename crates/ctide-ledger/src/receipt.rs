//! Receipts and typed ledger responses.
//!
//! Ledger responses are parsed into structs with the fields this client
//! relies on made optional and everything else kept in an `extra` map.
//! Missing fields get deterministic fallbacks; nothing assumes the ledger
//! returned `height` or `merkleRoot`.

use std::collections::BTreeMap;

use ctide_core::Timestamp;
use ctide_crypto::{MerkleProof, ProofSource};
use serde::{Deserialize, Serialize};

/// Connection lifecycle of the ledger client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Not started, or closed.
    Disconnected,
    /// Health probe succeeded; transactions go to the ledger.
    Connected,
    /// Ledger unreachable; receipts are computed locally.
    Degraded,
}

impl std::fmt::Display for LedgerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        })
    }
}

/// Result of anchoring one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoringReceipt {
    pub transaction_hash: String,
    /// Ledger-assigned height, or a synthetic ordinal in degraded mode.
    pub block_height: u64,
    pub merkle_root: String,
    pub anchoring_timestamp: Timestamp,
    /// Whether the receipt came from the ledger or was computed locally.
    pub mode: LedgerMode,
    /// Whether the submitted envelope carried a signature.
    pub signed: bool,
}

/// Response body of a transaction submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub merkle_root: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SubmitResponse {
    pub fn transaction_hash_or(&self, fallback: &str) -> String {
        self.hash
            .as_deref()
            .or(self.transaction_hash.as_deref())
            .filter(|h| !h.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    /// `fallback` runs only when the ledger reported no height.
    pub fn height_or_else(&self, fallback: impl FnOnce() -> u64) -> u64 {
        self.height.or(self.block_height).unwrap_or_else(fallback)
    }

    pub fn merkle_root_or(&self, fallback: &str) -> String {
        self.merkle_root
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Response body of a proof fetch.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LedgerProofResponse {
    pub root: String,
    #[serde(default)]
    pub path: Vec<String>,
    pub leaf: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl From<LedgerProofResponse> for MerkleProof {
    fn from(r: LedgerProofResponse) -> Self {
        MerkleProof {
            root: r.root,
            path: r.path,
            leaf: r.leaf,
            verified: r.verified,
            source: ProofSource::LedgerAttested,
        }
    }
}

/// Best-effort snapshot of ledger connectivity. Always produced, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub connected: bool,
    pub mode: LedgerMode,
    pub network_id: String,
    pub node_url: String,
    /// Whether the event stream task is running.
    pub event_stream: bool,
    /// Number of cluster peers reported by the node, when known.
    pub node_count: usize,
    /// Raw cluster info, when the node answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<serde_json::Value>,
    /// Why cluster info is missing, when the node did not answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
