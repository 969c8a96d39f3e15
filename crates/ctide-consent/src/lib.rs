//! # ctide-consent: Consent Lifecycle Orchestration
//!
//! Ties the workspace together:
//!
//! - [`store`]: the `ConsentStore` persistence seam and an in-memory store
//!   with an atomic insert-if-absent per `(user, controller, purpose)` tuple.
//! - [`audit`]: the `AuditSink` seam and a bounded in-memory trail.
//! - [`engine`]: `ConsentEngine` with grant, verify, revoke, lazy expiry,
//!   the expiry sweeper and compliance reporting.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ctide_consent::{ConsentEngine, GrantRequest, InMemoryAuditLog, InMemoryConsentStore};
//! use ctide_core::UserRef;
//! use ctide_ledger::{LedgerClient, LedgerConfig};
//! use ctide_state::LawfulBasis;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LedgerConfig::from_env()?;
//! let signer = LedgerClient::signer_from_config(&config)?;
//! let ledger = Arc::new(LedgerClient::connect(config, signer).await?);
//! let engine = ConsentEngine::new(
//!     Arc::new(InMemoryConsentStore::new()),
//!     ledger,
//!     Arc::new(InMemoryAuditLog::default()),
//! );
//! let user = UserRef::new("user_0123456789abcdef")?;
//! engine
//!     .grant(GrantRequest {
//!         user_ref: user.clone(),
//!         controller_id: "acme".into(),
//!         purpose: "marketing".into(),
//!         data_categories: vec!["email".into()],
//!         lawful_basis: LawfulBasis::Consent,
//!         expires_at: None,
//!     })
//!     .await?;
//! assert!(engine.verify(&user, "acme", "marketing").await?.is_valid());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod engine;
pub mod error;
pub mod store;

pub use audit::{AuditAction, AuditEntry, AuditSink, InMemoryAuditLog};
pub use engine::{
    AnchoringOutcome, ComplianceReport, Confidence, ConsentEngine, ConsentSummary, GrantOutcome,
    GrantRequest, InvalidReason, RevokeOutcome, ValidConsent, Verification, REPORT_RECENT_LIMIT,
};
pub use error::{AuditError, ConsentError, StoreError};
pub use store::{ConsentStore, ConsentUpdate, InMemoryConsentStore};
