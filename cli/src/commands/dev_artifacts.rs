//! Write a matching set of development proving artifacts

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::config::{artifacts_dir, MixerConfig};
use crate::crypto::DevArtifacts;

pub const CIRCUIT_FILE: &str = "circuit.json";
pub const PROVING_KEY_FILE: &str = "proving_key.bin";
pub const VERIFICATION_KEY_FILE: &str = "verification_key.json";

/// Write the three artifact files into `dir`, returning their paths
pub fn write_artifacts(artifacts: &DevArtifacts, dir: &Path) -> Result<[PathBuf; 3]> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let circuit = dir.join(CIRCUIT_FILE);
    let proving_key = dir.join(PROVING_KEY_FILE);
    let verification_key = dir.join(VERIFICATION_KEY_FILE);

    fs::write(&circuit, serde_json::to_vec_pretty(&artifacts.circuit)?)?;
    fs::write(&proving_key, &artifacts.proving_key)?;
    fs::write(
        &verification_key,
        serde_json::to_vec_pretty(&artifacts.verification_key)?,
    )?;

    Ok([circuit, proving_key, verification_key])
}

pub fn run(config: &MixerConfig, out: Option<PathBuf>, depth: Option<usize>) -> Result<()> {
    let depth = depth.unwrap_or(config.artifacts.tree_depth);
    if depth == 0 || depth > 32 {
        bail!("Tree depth must be between 1 and 32");
    }
    let dir = match out {
        Some(dir) => dir,
        None => artifacts_dir()?,
    };

    let artifacts = DevArtifacts::generate(depth);
    let [circuit, proving_key, verification_key] = write_artifacts(&artifacts, &dir)?;

    println!("{}", "Development artifacts written.".green().bold());
    println!();
    println!("  Circuit:          {}", circuit.display());
    println!("  Proving key:      {}", proving_key.display());
    println!("  Verification key: {}", verification_key.display());
    println!("  Tree depth:       {}", depth);
    println!();
    println!(
        "{}",
        "WARNING: these proofs are NOT zero-knowledge. They reveal the witness and only".red()
    );
    println!(
        "{}",
        "work against a mixer deployed with the matching development verifier.".red()
    );

    if depth != config.artifacts.tree_depth {
        println!();
        println!(
            "{}",
            format!("Set artifacts.tree_depth to {} to use these files.", depth).yellow()
        );
    }

    Ok(())
}
