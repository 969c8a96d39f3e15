//! # Status Subcommand
//!
//! Loads `LedgerConfig` from the environment, probes the node and prints the
//! resulting `NetworkStatus`. Exits 0 when connected, 2 otherwise.

use anyhow::{Context, Result};
use clap::Args;
use ctide_ledger::{LedgerClient, LedgerConfig};
use url::Url;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Override `CTIDE_LEDGER_NODE_URL`.
    #[arg(long)]
    pub node_url: Option<String>,
}

pub fn run_status(args: &StatusArgs) -> Result<u8> {
    let mut config = LedgerConfig::from_env().context("loading ledger configuration")?;
    if let Some(raw) = &args.node_url {
        config.node_url = Url::parse(raw).with_context(|| format!("invalid --node-url {raw}"))?;
    }
    crate::runtime()?.block_on(status(config))
}

async fn status(config: LedgerConfig) -> Result<u8> {
    let signer = LedgerClient::signer_from_config(&config)?;
    let client = LedgerClient::connect(config, signer).await?;
    let status = client.get_network_status().await;
    client.close();
    crate::print_json(&status)?;
    Ok(if status.connected { 0 } else { 2 })
}
