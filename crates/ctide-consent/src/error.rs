//! Error types for consent orchestration.
//!
//! Messages carry consent ids and statuses. Subject references, controller
//! names and purposes are never formatted into an error.

use ctide_core::{ConsentId, CoreError};
use ctide_state::{ConsentStateError, ConsentStatus};
use thiserror::Error;

/// Errors from a [`crate::ConsentStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// An active record already exists for the tuple.
    #[error("consent conflict: {existing} is already active")]
    Conflict { existing: ConsentId },

    /// The id is already used by another record of any status.
    #[error("consent id {0} is already taken")]
    IdTaken(ConsentId),

    #[error("consent {0} not found")]
    NotFound(ConsentId),

    /// The requested update is not a legal lifecycle transition.
    #[error("illegal transition for {consent_id}: {source}")]
    Transition {
        consent_id: ConsentId,
        source: ConsentStateError,
    },

    /// Backend failure (connection, constraint, I/O).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors from an [`crate::AuditSink`]. Never surfaced by the engine.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors from [`crate::ConsentEngine`] operations.
#[derive(Error, Debug)]
pub enum ConsentError {
    /// Input rejected before any state change.
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("an active consent already exists for this subject, controller and purpose")]
    DuplicateActiveConsent { existing: ConsentId },

    /// The requester does not own the consent. The record is untouched.
    #[error("consent {consent_id} does not belong to the requester")]
    AccessDenied { consent_id: ConsentId },

    #[error("consent {consent_id} is {from} and cannot change state")]
    InvalidStateTransition {
        consent_id: ConsentId,
        from: ConsentStatus,
    },

    #[error("consent {0} not found")]
    NotFound(ConsentId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ConsentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { existing } => Self::DuplicateActiveConsent { existing },
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Transition { consent_id, source } => Self::InvalidStateTransition {
                consent_id,
                from: match source {
                    ConsentStateError::TerminalState { state } => state,
                    ConsentStateError::InvalidTransition { from, .. } => from,
                },
            },
            other => Self::Store(other),
        }
    }
}

pub(crate) fn validation(field: &'static str, reason: &str) -> ConsentError {
    ConsentError::Validation(CoreError::Validation {
        field,
        reason: reason.to_string(),
    })
}
