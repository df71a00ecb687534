//! Show configuration and vault info

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::config::{config_file, format_ether, mixer_dir, vault_file, MixerConfig};
use crate::secure_storage::DepositVault;

fn not_set() -> String {
    "NOT CONFIGURED".red().to_string()
}

pub fn run(config: &MixerConfig, config_path: Option<&Path>) -> Result<()> {
    println!();
    println!("{}", "Mixer Configuration".yellow().bold());
    println!();

    let config_path = match config_path {
        Some(p) => p.to_path_buf(),
        None => config_file()?,
    };
    let vault_path = vault_file()?;

    println!("{}:", "Data Directory".cyan());
    println!("  {}", mixer_dir()?.display());
    println!();

    println!("{}:", "Network".cyan());
    println!("  RPC:      {}", config.network.rpc_url);
    println!("  Chain ID: {}", config.network.chain_id);
    println!(
        "  Mixer:    {}",
        config.network.mixer_address.clone().unwrap_or_else(not_set)
    );
    println!("  Timeout:  {}s", config.network.timeout_secs);
    println!();

    println!("{}:", "Relayer".cyan());
    println!("  URL:         {}", config.relayer.url);
    println!(
        "  Broadcaster: {}",
        config.relayer.broadcaster_address.clone().unwrap_or_else(not_set)
    );
    match config.fee_wei() {
        Ok(fee) => println!("  Fee:         {} ETH", format_ether(&fee)),
        Err(_) => println!("  Fee:         {}", config.relayer.fee_eth.red()),
    }
    println!("  Timeout:     {}s", config.relayer.timeout_secs);
    println!();

    println!("{}:", "Proving Artifacts".cyan());
    println!("  Circuit:          {}", config.artifacts.circuit);
    println!("  Proving key:      {}", config.artifacts.proving_key);
    println!("  Verification key: {}", config.artifacts.verification_key);
    println!("  Tree depth:       {}", config.artifacts.tree_depth);
    println!();

    println!("{}:", "Withdrawal Timer".cyan());
    if config.timer.production {
        println!("  Policy: next UTC midnight after the deposit");
    } else {
        println!(
            "  Policy: {} after activation {}",
            format!("{}s", config.timer.fixed_delay_seconds),
            "(development)".yellow()
        );
    }
    println!(
        "  Past deposits: {}",
        if config.timer.auto_withdraw_past_deposits {
            "withdraw automatically"
        } else {
            "wait for a manual trigger"
        }
    );
    println!();

    println!("{}:", "File Locations".cyan());
    println!(
        "  Config: {} {}",
        config_path.display(),
        if config_path.exists() { "" } else { "(defaults)" }.dimmed()
    );
    if DepositVault::exists(&vault_path) {
        println!("  Vault:  {} {}", vault_path.display(), "(encrypted)".green());
    } else {
        println!("  Vault:  {} {}", vault_path.display(), "(not created)".dimmed());
        println!("  Run 'mixer identity --recipient <address>' to create it");
    }

    Ok(())
}
