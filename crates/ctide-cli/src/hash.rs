//! # Hash Subcommand
//!
//! Prints the identifiers the engine derives, so operators can look up a
//! record without handling raw personal data in the store.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ctide_core::{derive, Timestamp, UserRef};

#[derive(Args, Debug)]
pub struct HashArgs {
    #[command(subcommand)]
    pub command: HashCommand,
}

#[derive(Subcommand, Debug)]
pub enum HashCommand {
    /// User reference and user id for an email address.
    Email {
        email: String,
    },
    /// Controller hash for a controller identifier.
    Controller {
        controller_id: String,
    },
    /// Controller identifier derived from an organization name.
    Organization {
        name: String,
    },
    /// Purpose hash for a purpose string.
    Purpose {
        purpose: String,
    },
    /// Consent id for a grant.
    ConsentId {
        #[arg(long)]
        user_ref: String,
        #[arg(long)]
        controller: String,
        #[arg(long)]
        purpose: String,
        /// Grant time, RFC 3339 or epoch milliseconds.
        #[arg(long)]
        granted_at: String,
    },
}

pub fn run_hash(args: &HashArgs) -> Result<u8> {
    let out = match &args.command {
        HashCommand::Email { email } => serde_json::json!({
            "userRef": derive::user_ref_from_email(email),
            "userId": derive::user_id_from_email(email),
        }),
        HashCommand::Controller { controller_id } => serde_json::json!({
            "controllerHash": derive::controller_hash(controller_id),
        }),
        HashCommand::Organization { name } => serde_json::json!({
            "controllerId": derive::controller_id_from_org(name),
        }),
        HashCommand::Purpose { purpose } => serde_json::json!({
            "purposeHash": derive::purpose_hash(purpose),
        }),
        HashCommand::ConsentId {
            user_ref,
            controller,
            purpose,
            granted_at,
        } => {
            let user_ref = UserRef::new(user_ref.as_str())?;
            let at = parse_timestamp(granted_at)?;
            serde_json::json!({
                "consentId": derive::consent_id(&user_ref, controller, purpose, at),
                "grantedAt": at,
            })
        }
    };
    crate::print_json(&out)?;
    Ok(0)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<Timestamp> {
    if let Ok(ms) = raw.trim().parse::<i64>() {
        return Ok(Timestamp::from_millis(ms));
    }
    Timestamp::parse_rfc3339(raw).context("expected RFC 3339 or epoch milliseconds")
}
