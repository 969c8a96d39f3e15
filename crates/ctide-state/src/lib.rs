//! # ctide-state: Consent Lifecycle
//!
//! ```text
//! (none) ──grant──▶ Granted ──revoke──▶ Revoked  (terminal)
//!                      │
//!                      └──expire──▶ Expired      (terminal)
//! ```
//!
//! A terminal record is never revived. Granting the same tuple again creates
//! a new record with a new consent id.

pub mod consent;
pub mod lawful_basis;

pub use consent::{ConsentRecord, ConsentStateError, ConsentStatus, ConsentTransition, NewConsent};
pub use lawful_basis::LawfulBasis;
