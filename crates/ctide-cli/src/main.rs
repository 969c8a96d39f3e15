//! # ctide CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ctide_cli::demo::{run_demo, DemoArgs};
use ctide_cli::hash::{run_hash, HashArgs};
use ctide_cli::keygen::{run_keygen, KeygenArgs};
use ctide_cli::proof::{run_proof, ProofArgs};
use ctide_cli::status::{run_status, StatusArgs};

/// Consent integrity engine tooling.
///
/// Derives pseudonymous identifiers, generates and verifies Merkle proofs,
/// creates ledger signing keys and inspects ledger connectivity. Ledger
/// settings come from `CTIDE_*` environment variables.
#[derive(Parser, Debug)]
#[command(name = "ctide", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive user references, controller/purpose hashes and consent ids.
    Hash(HashArgs),

    /// Generate or verify self-consistency Merkle proofs.
    Proof(ProofArgs),

    /// Create an Ed25519 seed for signing ledger transactions.
    Keygen(KeygenArgs),

    /// Probe the configured ledger and print its network status.
    Status(StatusArgs),

    /// Run grant, verify, revoke and re-grant for one subject.
    Demo(DemoArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Hash(args) => run_hash(&args),
        Commands::Proof(args) => run_proof(&args),
        Commands::Keygen(args) => run_keygen(&args),
        Commands::Status(args) => run_status(&args),
        Commands::Demo(args) => run_demo(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
