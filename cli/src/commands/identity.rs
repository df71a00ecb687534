//! Create a deposit identity and store it in the vault

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::commands::open_vault;
use crate::config::MixerConfig;
use crate::crypto::{generate_identity, DevPrimitives};
use crate::primitives::CryptoPrimitives;
use crate::store::{DepositRecord, DepositRecordStore};
use crate::timer::next_utc_midnight;
use crate::types::is_valid_address;

pub struct IdentityOptions {
    /// Address that receives the withdrawal
    pub recipient: String,
    /// When the deposit was made (default: now)
    pub deposited_at: Option<String>,
}

pub fn run(config: &MixerConfig, options: IdentityOptions) -> Result<()> {
    if !is_valid_address(&options.recipient) {
        bail!("Invalid recipient address: {}", options.recipient);
    }

    let deposited_at = match options.deposited_at.as_deref() {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .context("Deposit time must be RFC 3339, e.g. 2021-01-01T15:00:00Z")?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    println!("{}", "=== Mixer Deposit Identity ===".cyan().bold());
    println!();

    let primitives = DevPrimitives::new(config.artifacts.tree_depth);
    let (private_key, nullifier) = generate_identity();
    let public_key = primitives
        .derive_public_key(&private_key)
        .map_err(|e| anyhow::anyhow!("Failed to derive public key: {}", e))?;
    let commitment = primitives
        .derive_identity_commitment(&nullifier, &public_key)
        .map_err(|e| anyhow::anyhow!("Failed to derive identity commitment: {}", e))?;

    let record = DepositRecord::new(private_key, nullifier, &options.recipient, deposited_at);
    let id = record.id();

    let vault = open_vault()?;
    vault.insert(record)?;

    println!("{}", "Identity generated and encrypted successfully!".green().bold());
    println!();
    println!("{}:", "Deposit ID".yellow());
    println!("  {}", id);
    println!();
    println!("{}:", "Identity Commitment (deposit this into the mixer)".yellow());
    println!("  {}", commitment);
    println!("  {}", commitment.to_hex().dimmed());
    println!();
    println!("{}:", "Recipient".yellow());
    println!("  {}", options.recipient);
    println!();
    println!(
        "Withdrawable from {} UTC",
        next_utc_midnight(deposited_at).format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    println!(
        "{}",
        format!("Encrypted vault: {}", vault.path().display()).dimmed()
    );

    Ok(())
}
