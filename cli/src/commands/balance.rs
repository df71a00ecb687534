//! Show the ether balance of a recipient address

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::chain::ChainContext;
use crate::commands::{open_vault, select_record};
use crate::config::{format_ether, MixerConfig};
use crate::types::is_valid_address;

pub async fn run(config: &MixerConfig, address: Option<&str>) -> Result<()> {
    let address = match address {
        Some(address) => address.to_string(),
        None => {
            let vault = open_vault()?;
            select_record(&vault, None)?.recipient_address
        }
    };
    if !is_valid_address(&address) {
        bail!("Invalid address: {}", address);
    }

    println!("{}", "Fetching balance...".cyan());

    let mixer_address = config.network.mixer_address.as_deref().unwrap_or_default();
    let chain = config.chain(mixer_address)?;

    let balance = chain
        .get_balance(&address)
        .await
        .with_context(|| format!("Failed to fetch balance from {}", config.network.rpc_url))?;

    println!();
    println!("{}", "Balance".yellow().bold());
    println!();
    println!("Address: {}", address);
    println!("Balance: {} ETH", format_ether(&balance).green());

    if !mixer_address.is_empty() {
        if let Ok(pool) = chain.get_balance(mixer_address).await {
            println!();
            println!("{}", format!("Mixer pool holds {} ETH", format_ether(&pool)).dimmed());
        }
    }

    Ok(())
}
