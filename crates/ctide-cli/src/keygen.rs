//! # Keygen Subcommand
//!
//! Writes a fresh Ed25519 seed (hex) for `CTIDE_SIGNING_KEY` and prints the
//! public key. The seed is written to a new file only, never to stdout.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ctide_crypto::Ed25519KeyPair;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// File to create with the hex seed. Refuses to overwrite.
    #[arg(long)]
    pub out: PathBuf,
}

pub fn run_keygen(args: &KeygenArgs) -> Result<u8> {
    let keypair = Ed25519KeyPair::generate();
    write_seed(&args.out, &keypair)?;
    tracing::info!(path = %args.out.display(), "signing seed written");
    println!("public key: {}", keypair.public_key().to_hex());
    Ok(0)
}

fn write_seed(path: &std::path::Path, keypair: &Ed25519KeyPair) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let seed = keypair.seed_hex();
    file.write_all(seed.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
