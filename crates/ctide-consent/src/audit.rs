//! # Consent Audit Trail
//!
//! Every grant, verification, revocation and expiry is appended to an
//! [`AuditSink`]. Appends are fire-and-forget from the engine's point of
//! view: a failing sink is logged and the operation still succeeds.
//!
//! Entries hold hashes and ids only. Each entry is individually digestable
//! via `CanonicalBytes` + `sha256_digest`, and [`InMemoryAuditLog`] folds
//! those digests into a running head so any rewrite of history changes it.

use ctide_core::{
    sha256_digest, CanonicalBytes, ConsentId, ContentDigest, ControllerHash, PurposeHash,
    Timestamp,
};
use ctide_state::LawfulBasis;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;

/// What happened to a consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ConsentGranted,
    ConsentVerified,
    ConsentRevoked,
    ConsentExpired,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsentGranted => "consent_granted",
            Self::ConsentVerified => "consent_verified",
            Self::ConsentRevoked => "consent_revoked",
            Self::ConsentExpired => "consent_expired",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub consent_id: ConsentId,
    pub controller_hash: ControllerHash,
    pub purpose_hash: PurposeHash,
    pub lawful_basis: LawfulBasis,
    /// Anchoring transaction, when the ledger confirmed one.
    pub ledger_tx_ref: Option<String>,
    pub timestamp: Timestamp,
    /// Action-specific detail, e.g. the revocation reason.
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        record: &ctide_state::ConsentRecord,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            consent_id: record.consent_id.clone(),
            controller_hash: record.controller_hash.clone(),
            purpose_hash: record.purpose_hash.clone(),
            lawful_basis: record.lawful_basis,
            ledger_tx_ref: record.ledger_tx_ref.clone(),
            timestamp,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Content digest of this entry. `None` if canonicalization fails
    /// (details containing floats).
    pub fn digest(&self) -> Option<ContentDigest> {
        match CanonicalBytes::new(self) {
            Ok(c) => Some(sha256_digest(&c)),
            Err(e) => {
                tracing::warn!(action = %self.action, error = %e, "audit entry canonicalization failed");
                None
            }
        }
    }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Fold one entry digest into the chain head.
fn chain(prev: Option<&ContentDigest>, entry: &ContentDigest) -> Option<ContentDigest> {
    let link = serde_json::json!({
        "prev": prev.map(ContentDigest::to_hex),
        "entry": entry.to_hex(),
    });
    CanonicalBytes::new(&link).ok().map(|c| sha256_digest(&c))
}

#[derive(Debug, Default)]
struct Trail {
    entries: Vec<AuditEntry>,
    head: Option<ContentDigest>,
}

/// Bounded in-memory audit trail. When full, the oldest 10% is trimmed; the
/// chain head still covers every entry ever appended.
#[derive(Debug)]
pub struct InMemoryAuditLog {
    trail: Mutex<Trail>,
    max_entries: usize,
}

impl InMemoryAuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            trail: Mutex::new(Trail::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.trail.lock().entries.clone()
    }

    /// Digest chained over all appended entries. `None` while empty.
    pub fn head(&self) -> Option<ContentDigest> {
        self.trail.lock().head
    }

    pub fn entries_for(&self, consent_id: &ConsentId) -> Vec<AuditEntry> {
        self.trail
            .lock()
            .entries
            .iter()
            .filter(|e| &e.consent_id == consent_id)
            .cloned()
            .collect()
    }

    pub fn entries_by_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.trail
            .lock()
            .entries
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trail.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let digest = entry.digest();
        let mut trail = self.trail.lock();
        if let Some(d) = digest {
            trail.head = chain(trail.head.as_ref(), &d).or(trail.head);
        }
        trail.entries.push(entry);
        if trail.entries.len() > self.max_entries {
            let trim = (self.max_entries / 10).max(1);
            trail.entries.drain(..trim);
        }
        Ok(())
    }
}

/// Append to `sink`, logging and swallowing failures.
pub(crate) fn record(sink: &dyn AuditSink, entry: AuditEntry) {
    let action = entry.action;
    let consent_id = entry.consent_id.clone();
    if let Err(e) = sink.append(entry) {
        tracing::warn!(%action, consent_id = %consent_id, error = %e, "audit append failed");
    }
}
