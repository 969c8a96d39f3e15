//! # Proof Subcommand
//!
//! `generate` prints the self-consistency proof for a consent id.
//! `verify` checks a proof document and exits 0 when it holds, 2 when not.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ctide_core::ConsentId;
use ctide_crypto::{self_consistency_proof, verify_proof, verify_proof_for, MerkleProof};

#[derive(Args, Debug)]
pub struct ProofArgs {
    #[command(subcommand)]
    pub command: ProofCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProofCommand {
    /// Print the self-consistency proof for a consent id.
    Generate {
        consent_id: String,
        #[arg(long, default_value_t = ctide_crypto::DEFAULT_MERKLE_DEPTH)]
        depth: usize,
    },
    /// Verify a proof document (JSON).
    Verify {
        /// Path to the proof JSON.
        file: PathBuf,
        /// Also require the proof's leaf to belong to this consent id.
        #[arg(long)]
        consent_id: Option<String>,
    },
}

pub fn run_proof(args: &ProofArgs) -> Result<u8> {
    match &args.command {
        ProofCommand::Generate { consent_id, depth } => {
            let id = ConsentId::parse(consent_id)?;
            crate::print_json(&self_consistency_proof(&id, *depth))?;
            Ok(0)
        }
        ProofCommand::Verify { file, consent_id } => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let proof: MerkleProof =
                serde_json::from_str(&raw).context("proof document is not valid JSON")?;
            let ok = match consent_id {
                Some(id) => verify_proof_for(&ConsentId::parse(id)?, &proof),
                None => verify_proof(&proof),
            };
            println!(
                "{} ({} proof, {} levels)",
                if ok { "VALID" } else { "INVALID" },
                proof.source,
                proof.path.len()
            );
            Ok(if ok { 0 } else { 2 })
        }
    }
}
