//! # Transaction Envelope
//!
//! Wire shape: `{namespace, action, data, signatures[], fee, timestamp}`.
//!
//! Signatures cover the canonical form of the envelope *without* the
//! `signatures` field. The transaction hash is the SHA-256 of the canonical
//! form *with* signatures, so it commits to who signed. An unsigned envelope
//! carries an empty `signatures` list.

use ctide_core::{
    sha256_digest, CanonicalBytes, ConsentId, ContentDigest, ControllerHash, PurposeHash, Timestamp,
};
use ctide_crypto::{DetachedSignature, TransactionSigner};
use ctide_state::{ConsentRecord, ConsentStatus, LawfulBasis};
use serde::{Deserialize, Serialize};

use crate::config::FeeSchedule;
use crate::error::LedgerError;

/// The operation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentAction {
    GrantConsent,
    UpdateConsentStatus,
}

impl std::fmt::Display for ConsentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::GrantConsent => "grant_consent",
            Self::UpdateConsentStatus => "update_consent_status",
        })
    }
}

/// Data anchored for a new grant. Hashes only; the subject reference is
/// deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPayload {
    pub consent_id: ConsentId,
    pub controller_hash: ControllerHash,
    pub purpose_hash: PurposeHash,
    pub lawful_basis: LawfulBasis,
    pub status: ConsentStatus,
    pub granted_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

impl GrantPayload {
    pub fn from_record(record: &ConsentRecord) -> Self {
        Self {
            consent_id: record.consent_id.clone(),
            controller_hash: record.controller_hash.clone(),
            purpose_hash: record.purpose_hash.clone(),
            lawful_basis: record.lawful_basis,
            status: record.status,
            granted_at: record.granted_at,
            expires_at: record.expires_at,
        }
    }
}

/// Data anchored for a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdatePayload {
    pub consent_id: ConsentId,
    pub status: ConsentStatus,
    pub updated_at: Timestamp,
}

#[derive(Serialize)]
struct SigningView<'a> {
    namespace: &'a str,
    action: ConsentAction,
    data: &'a serde_json::Value,
    fee: u64,
    timestamp: Timestamp,
}

/// A signed ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HgtpTransaction {
    pub namespace: String,
    pub action: ConsentAction,
    pub data: serde_json::Value,
    pub signatures: Vec<DetachedSignature>,
    pub fee: u64,
    pub timestamp: Timestamp,
}

impl HgtpTransaction {
    /// Build and sign an envelope. With no signer the envelope is unsigned.
    pub fn build(
        namespace: &str,
        action: ConsentAction,
        payload: &impl Serialize,
        fees: FeeSchedule,
        timestamp: Timestamp,
        signer: Option<&dyn TransactionSigner>,
    ) -> Result<Self, LedgerError> {
        let payload_bytes = CanonicalBytes::new(payload)?;
        let fee = fees.fee_for(&payload_bytes);
        // Canonical bytes are JSON by construction.
        let data: serde_json::Value = serde_json::from_slice(payload_bytes.as_bytes())
            .map_err(ctide_core::CanonicalizationError::from)?;

        let mut tx = Self {
            namespace: namespace.to_string(),
            action,
            data,
            signatures: Vec::new(),
            fee,
            timestamp,
        };
        if let Some(signer) = signer {
            let message = tx.signing_bytes()?;
            tx.signatures.push(signer.sign(&message)?);
        }
        Ok(tx)
    }

    /// Canonical bytes covered by signatures.
    pub fn signing_bytes(&self) -> Result<CanonicalBytes, LedgerError> {
        Ok(CanonicalBytes::new(&SigningView {
            namespace: &self.namespace,
            action: self.action,
            data: &self.data,
            fee: self.fee,
            timestamp: self.timestamp,
        })?)
    }

    /// SHA-256 over the full canonical envelope.
    pub fn digest(&self) -> Result<ContentDigest, LedgerError> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }

    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty()
    }
}

impl FeeSchedule {
    /// `max(minimum_fee, bytes * per_byte_rate)`, saturating.
    pub fn fee_for(&self, payload: &CanonicalBytes) -> u64 {
        let size = payload.len() as u64;
        size.saturating_mul(self.per_byte_rate).max(self.minimum_fee)
    }
}
