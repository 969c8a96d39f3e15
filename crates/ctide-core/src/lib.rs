//! # ctide-core: Foundational Types for the Consent Integrity Engine
//!
//! Every other crate in the workspace depends on `ctide-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Opaque identifiers only.** `UserRef`, `ControllerHash`, `PurposeHash`
//!    and `ConsentId` are newtypes. Raw controller names, purpose strings and
//!    email addresses are hashed at the boundary in [`derive`] and never stored.
//!
//! 2. **`CanonicalBytes` newtype.** Everything that is signed, hashed as a
//!    transaction, or sized for a fee flows through `CanonicalBytes::new()`.
//!
//! 3. **Epoch-millisecond timestamps.** `Timestamp` is UTC milliseconds since
//!    the Unix epoch, the unit used on the ledger wire and in consent records.
//!    Time is read through the [`Clock`] trait so expiry can be tested.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `ctide-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod derive;
pub mod digest;
pub mod error;
pub mod hex;
pub mod identity;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, CoreError};
pub use identity::{ConsentId, ControllerHash, PurposeHash, UserRef};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
