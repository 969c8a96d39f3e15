//! # Domain Identity Newtypes
//!
//! You cannot pass a `PurposeHash` where a `ControllerHash` is expected, and
//! nothing in the engine holds a raw controller name or purpose string past
//! the derivation boundary.
//!
//! Hash-shaped identifiers validate their format on construction and on
//! deserialization (`try_from = "String"`), so a store row or a CLI argument
//! cannot smuggle in an arbitrary string.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hex::is_lower_hex;

/// Length of a general-purpose hash in hex characters.
pub const HASH_HEX_LEN: usize = 64;

/// Length of a compact identifier in hex characters.
pub const COMPACT_HEX_LEN: usize = 32;

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate a lowercase hex identifier.
            pub fn parse(s: &str) -> Result<Self, CoreError> {
                let s = s.trim();
                if !is_lower_hex(s, $len) {
                    return Err(CoreError::validation(
                        $field,
                        format!("expected {} lowercase hex characters", $len),
                    ));
                }
                Ok(Self(s.to_string()))
            }

            pub(crate) fn from_derived(hex: String) -> Self {
                Self(hex)
            }

            /// Access the hex string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

hex_identifier!(
    /// Content-derived consent identifier (32 hex characters).
    ///
    /// Immutable once created; a repeated grant of the same tuple produces a
    /// new id because the grant timestamp is part of the derivation.
    ConsentId,
    COMPACT_HEX_LEN,
    "consent_id"
);

hex_identifier!(
    /// One-way hash of a controller identifier.
    ControllerHash,
    HASH_HEX_LEN,
    "controller_hash"
);

hex_identifier!(
    /// One-way hash of a processing purpose.
    PurposeHash,
    HASH_HEX_LEN,
    "purpose_hash"
);

/// Opaque reference to a data subject.
///
/// Supplied by the caller (typically produced by
/// [`crate::derive::user_ref_from_email`] or an upstream account id). The
/// engine only compares it for equality; it never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserRef(String);

impl UserRef {
    /// Create a user reference, rejecting empty or whitespace-only input.
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(CoreError::validation("user_ref", "must not be empty"));
        }
        Ok(Self(s))
    }

    pub(crate) fn from_derived(hash: String) -> Self {
        Self(hash)
    }

    /// Access the reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserRef {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<UserRef> for String {
    fn from(u: UserRef) -> String {
        u.0
    }
}

impl std::fmt::Display for UserRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
