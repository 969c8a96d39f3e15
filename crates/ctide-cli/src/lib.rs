//! # ctide-cli: Consent Integrity Engine Command-Line Interface
//!
//! ## Subcommands
//!
//! - `hash`: derive user references, controller/purpose hashes and consent ids
//! - `proof`: generate and verify self-consistency Merkle proofs
//! - `keygen`: create an Ed25519 signing seed for ledger transactions
//! - `status`: probe the configured ledger and print its network status
//! - `demo`: run grant → verify → revoke → re-grant against the ledger
//!
//! Handlers return `anyhow::Result<u8>`; the value is the process exit code.
//! Argument parsing lives in `main.rs`, domain logic in the library crates.

pub mod demo;
pub mod hash;
pub mod keygen;
pub mod proof;
pub mod status;

/// Pretty-print a serializable value to stdout.
pub(crate) fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Current-thread runtime for the async subcommands.
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
