//! # Identifier Derivation
//!
//! Pure, deterministic functions that turn caller-supplied identifiers into
//! the opaque hashes stored on consent records and written to the ledger.
//!
//! All digests are SHA-256 over the UTF-8 input, rendered as lowercase hex:
//! 64 characters for general hashes, 32 for compact identifiers. Nothing here
//! reads the clock, the environment or a random source, so a hash computed
//! today matches the same hash computed after a restart.
//!
//! These functions never fail. An empty string is a valid hashable value;
//! rejecting empty input is the caller's job.

use sha2::{Digest, Sha256};

use crate::hex;
use crate::identity::{ConsentId, ControllerHash, PurposeHash, UserRef, COMPACT_HEX_LEN};
use crate::temporal::Timestamp;

/// Field separator for composite identifiers.
const COMPOSITE_SEPARATOR: char = '|';

/// SHA-256 of `input`, 64 lowercase hex characters.
pub fn hash_str(input: &str) -> String {
    hex::encode(&Sha256::digest(input.as_bytes()))
}

/// SHA-256 of `input` truncated to 32 hex characters.
pub fn compact_hash(input: &str) -> String {
    let mut full = hash_str(input);
    full.truncate(COMPACT_HEX_LEN);
    full
}

/// Lower-case and trim an email-like identifier.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Opaque subject reference for an email address.
///
/// Case and surrounding whitespace variants of the same address collide.
pub fn user_ref_from_email(email: &str) -> UserRef {
    UserRef::from_derived(hash_str(&normalize_email(email)))
}

/// Short account identifier for an email address: `user_` + 16 hex characters.
pub fn user_id_from_email(email: &str) -> String {
    let hash = hash_str(&normalize_email(email));
    format!("user_{}", &hash[..16])
}

/// Short controller identifier for an organization name: `ctrl_` followed by
/// up to 16 lowercase alphanumerics.
pub fn controller_id_from_org(organization: &str) -> String {
    let slug: String = organization
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(16)
        .collect();
    format!("ctrl_{slug}")
}

/// One-way hash of a controller identifier.
pub fn controller_hash(controller_id: &str) -> ControllerHash {
    ControllerHash::from_derived(hash_str(controller_id))
}

/// One-way hash of a processing purpose.
pub fn purpose_hash(purpose: &str) -> PurposeHash {
    PurposeHash::from_derived(hash_str(purpose))
}

/// Consent identifier for one grant.
///
/// Derived from `user_ref|controller_id|purpose|granted_at_ms`. The grant
/// timestamp makes a re-grant of a previously revoked tuple yield a new id.
pub fn consent_id(
    user_ref: &UserRef,
    controller_id: &str,
    purpose: &str,
    granted_at: Timestamp,
) -> ConsentId {
    let sep = COMPOSITE_SEPARATOR;
    let composite = format!(
        "{}{sep}{controller_id}{sep}{purpose}{sep}{}",
        user_ref.as_str(),
        granted_at.as_millis()
    );
    ConsentId::from_derived(compact_hash(&composite))
}
