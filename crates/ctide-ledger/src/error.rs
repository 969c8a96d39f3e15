//! Ledger client error types.
//!
//! Errors name endpoints and consent ids only. Signing keys, wallet secrets
//! and raw subject identifiers never appear in a message.

use ctide_core::CanonicalizationError;
use ctide_crypto::CryptoError;

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Transport failure reaching the ledger.
    #[error("ledger unavailable at {endpoint}: {source}")]
    Unavailable {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The call exceeded its timeout.
    #[error("ledger call to {endpoint} timed out")]
    Timeout { endpoint: String },
    /// The ledger answered with a non-2xx status.
    #[error("ledger {endpoint} returned {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// The ledger answered 2xx with a body that could not be parsed.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
    /// Signing is required but no key is configured.
    #[error("signing unavailable: no signing key configured")]
    SigningUnavailable,
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(#[from] CryptoError),
    /// The envelope could not be canonicalized.
    #[error("transaction encoding failed: {0}")]
    Encoding(#[from] CanonicalizationError),
    /// Strict deployment refused to start.
    #[error("ledger client startup rejected: {0}")]
    StartupRejected(String),
    /// The client has been closed.
    #[error("ledger client is not connected")]
    NotConnected,
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl LedgerError {
    /// Map a reqwest transport error, separating timeouts from other failures.
    pub(crate) fn transport(endpoint: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            Self::Unavailable {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }

    /// Whether the failure is the ledger being unreachable or slow, as
    /// opposed to a rejection or a local fault.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}
