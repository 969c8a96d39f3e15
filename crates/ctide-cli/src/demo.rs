//! # Demo Subcommand
//!
//! Walks one consent through its lifecycle and prints each step as JSON:
//! grant, verify, revoke, verify again (revoked), then re-grant under a new
//! consent id. The last step reports the audit trail length and chain head.
//! `--offline` skips the ledger health check and runs degraded.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use ctide_consent::{
    ConsentEngine, GrantRequest, InMemoryAuditLog, InMemoryConsentStore, Verification,
};
use ctide_core::UserRef;
use ctide_ledger::{LedgerClient, LedgerConfig};
use ctide_state::LawfulBasis;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Subject reference.
    #[arg(long, default_value = "u1")]
    pub user_ref: String,
    #[arg(long, default_value = "acme")]
    pub controller: String,
    #[arg(long, default_value = "marketing")]
    pub purpose: String,
    /// Do not contact the ledger.
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Serialize)]
struct Step {
    step: &'static str,
    result: serde_json::Value,
}

pub fn run_demo(args: &DemoArgs) -> Result<u8> {
    let config = LedgerConfig::from_env().context("loading ledger configuration")?;
    crate::runtime()?.block_on(demo(args, config))
}

async fn demo(args: &DemoArgs, config: LedgerConfig) -> Result<u8> {
    let ledger = ledger_for(config, args.offline).await?;
    let steps = scenario(args, ledger).await?;
    crate::print_json(&steps)?;
    Ok(0)
}

async fn ledger_for(config: LedgerConfig, offline: bool) -> Result<Arc<LedgerClient>> {
    let signer = LedgerClient::signer_from_config(&config)?;
    let client = if offline {
        LedgerClient::degraded(config, signer)?
    } else {
        LedgerClient::connect(config, signer).await?
    };
    Ok(Arc::new(client))
}

async fn scenario(args: &DemoArgs, ledger: Arc<LedgerClient>) -> Result<Vec<Step>> {
    let audit = Arc::new(InMemoryAuditLog::default());
    let engine = ConsentEngine::new(
        Arc::new(InMemoryConsentStore::new()),
        ledger.clone(),
        audit.clone(),
    );
    let user = UserRef::new(args.user_ref.as_str())?;
    let request = GrantRequest {
        user_ref: user.clone(),
        controller_id: args.controller.clone(),
        purpose: args.purpose.clone(),
        data_categories: vec!["email".into(), "name".into()],
        lawful_basis: LawfulBasis::Consent,
        expires_at: None,
    };

    let mut steps = Vec::with_capacity(6);
    let granted = engine.grant(request.clone()).await?;
    tracing::info!(consent_id = %granted.consent_id, mode = %granted.ledger_mode, "granted");
    let consent_id = granted.consent_id.clone();
    steps.push(step("grant", &granted)?);

    let verified = verify(&engine, &user, args).await?;
    steps.push(step("verify", &verified)?);

    let revoked = engine.revoke(&consent_id, &user).await?;
    steps.push(step("revoke", &revoked)?);

    let after = verify(&engine, &user, args).await?;
    steps.push(step("verify_after_revoke", &after)?);

    let regranted = engine.grant(request).await?;
    steps.push(step("regrant", &regranted)?);

    let trail = serde_json::json!({
        "entries": audit.len(),
        "head": audit.head().map(|d| d.to_hex()),
    });
    steps.push(step("audit", &trail)?);

    ledger.close();
    Ok(steps)
}

async fn verify(engine: &ConsentEngine, user: &UserRef, args: &DemoArgs) -> Result<Verification> {
    Ok(engine.verify(user, &args.controller, &args.purpose).await?)
}

fn step(name: &'static str, value: &impl Serialize) -> Result<Step> {
    Ok(Step {
        step: name,
        result: serde_json::to_value(value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> DemoArgs {
        DemoArgs {
            user_ref: "u1".into(),
            controller: "acme".into(),
            purpose: "marketing".into(),
            offline: true,
        }
    }

    #[tokio::test]
    async fn offline_scenario_walks_full_lifecycle() {
        let config = LedgerConfig::local("http://127.0.0.1:9").unwrap();
        let ledger = ledger_for(config, true).await.unwrap();
        let steps = scenario(&args(), ledger).await.unwrap();

        let names: Vec<_> = steps.iter().map(|s| s.step).collect();
        assert_eq!(
            names,
            ["grant", "verify", "revoke", "verify_after_revoke", "regrant", "audit"]
        );
        assert_eq!(steps[0].result["status"], "granted");
        assert_eq!(steps[0].result["ledgerMode"], "degraded");
        assert!(steps[0].result["ledgerTxRef"].is_null());
        assert_eq!(steps[1].result["result"], "valid");
        assert_eq!(steps[2].result["status"], "revoked");
        assert_eq!(steps[3].result["result"], "invalid");
        assert_eq!(steps[3].result["reason"], "revoked");
        assert_eq!(steps[4].result["status"], "granted");
        assert_ne!(steps[4].result["consentId"], steps[0].result["consentId"]);
        assert!(steps[5].result["entries"].as_u64().unwrap() >= 3);
        assert_eq!(steps[5].result["head"].as_str().unwrap().len(), 64);
    }
}
