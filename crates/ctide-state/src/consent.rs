//! # Consent Record State Machine
//!
//! A `ConsentRecord` holds only opaque hashes plus lifecycle metadata. Every
//! status change goes through a method here that checks the current state
//! and appends to the transition log.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ctide_core::{ConsentId, ControllerHash, PurposeHash, Timestamp, UserRef};

use crate::lawful_basis::LawfulBasis;

// ─── Status ──────────────────────────────────────────────────────────

/// The lifecycle status of a consent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    /// Consent is in force.
    Granted,
    /// Withdrawn by the data subject (terminal).
    Revoked,
    /// Past its expiry deadline (terminal).
    Expired,
}

impl ConsentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Rejected lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsentStateError {
    #[error("invalid consent transition: {from} -> {to}")]
    InvalidTransition {
        from: ConsentStatus,
        to: ConsentStatus,
    },

    #[error("consent is in terminal state {state}")]
    TerminalState { state: ConsentStatus },
}

// ─── Transition log ──────────────────────────────────────────────────

/// One entry in a record's transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentTransition {
    pub from: ConsentStatus,
    pub to: ConsentStatus,
    pub at: Timestamp,
    pub reason: String,
}

// ─── Record ──────────────────────────────────────────────────────────

/// Inputs for a fresh grant. Identifiers are already derived.
#[derive(Debug, Clone)]
pub struct NewConsent {
    pub consent_id: ConsentId,
    pub user_ref: UserRef,
    pub controller_hash: ControllerHash,
    pub purpose_hash: PurposeHash,
    pub data_categories: Vec<String>,
    pub lawful_basis: LawfulBasis,
    pub granted_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

/// One grant of permission from a data subject to a controller for a purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    pub consent_id: ConsentId,
    pub user_ref: UserRef,
    pub controller_hash: ControllerHash,
    pub purpose_hash: PurposeHash,
    pub data_categories: Vec<String>,
    pub lawful_basis: LawfulBasis,
    pub status: ConsentStatus,
    pub granted_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
    /// Hash of the grant's anchoring transaction. `None` until the ledger
    /// confirms the grant.
    pub ledger_tx_ref: Option<String>,
    /// Hash of the transaction anchoring the revocation.
    #[serde(default)]
    pub status_tx_ref: Option<String>,
    pub transitions: Vec<ConsentTransition>,
}

impl ConsentRecord {
    /// A new record in `Granted`, not yet anchored.
    pub fn granted(new: NewConsent) -> Self {
        Self {
            consent_id: new.consent_id,
            user_ref: new.user_ref,
            controller_hash: new.controller_hash,
            purpose_hash: new.purpose_hash,
            data_categories: new.data_categories,
            lawful_basis: new.lawful_basis,
            status: ConsentStatus::Granted,
            granted_at: new.granted_at,
            expires_at: new.expires_at,
            revoked_at: None,
            ledger_tx_ref: None,
            status_tx_ref: None,
            transitions: Vec::new(),
        }
    }

    /// Granted → Revoked.
    pub fn revoke(&mut self, at: Timestamp, reason: &str) -> Result<(), ConsentStateError> {
        self.require_granted(ConsentStatus::Revoked)?;
        self.revoked_at = Some(at);
        self.do_transition(ConsentStatus::Revoked, at, reason);
        Ok(())
    }

    /// Granted → Expired.
    pub fn expire(&mut self, at: Timestamp) -> Result<(), ConsentStateError> {
        self.require_granted(ConsentStatus::Expired)?;
        self.do_transition(ConsentStatus::Expired, at, "expired");
        Ok(())
    }

    /// Store the hash of the grant's confirmed anchoring transaction.
    pub fn record_anchor(&mut self, tx_hash: impl Into<String>) {
        self.ledger_tx_ref = Some(tx_hash.into());
    }

    /// Store the hash of the revocation's confirmed anchoring transaction.
    pub fn record_status_anchor(&mut self, tx_hash: impl Into<String>) {
        self.status_tx_ref = Some(tx_hash.into());
    }

    /// Whether `now` is strictly past the expiry deadline.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(false, |deadline| now > deadline)
    }

    /// `Granted` and not past its deadline.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.status == ConsentStatus::Granted && !self.is_expired_at(now)
    }

    /// Whether every anchored lifecycle change has a confirmed transaction:
    /// the grant always, the revocation once revoked. Expiry follows from the
    /// anchored deadline and is not submitted.
    pub fn is_anchored(&self) -> bool {
        self.ledger_tx_ref.is_some()
            && (self.status != ConsentStatus::Revoked || self.status_tx_ref.is_some())
    }

    fn require_granted(&self, target: ConsentStatus) -> Result<(), ConsentStateError> {
        if self.status.is_terminal() {
            return Err(ConsentStateError::TerminalState { state: self.status });
        }
        if self.status != ConsentStatus::Granted {
            return Err(ConsentStateError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: ConsentStatus, at: Timestamp, reason: &str) {
        self.transitions.push(ConsentTransition {
            from: self.status,
            to,
            at,
            reason: reason.to_string(),
        });
        self.status = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
