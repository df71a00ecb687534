//! List stored deposits

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use crate::commands::open_vault;
use crate::config::MixerConfig;
use crate::store::DepositRecordStore;
use crate::timer::{next_utc_midnight, Countdown};

pub fn run(config: &MixerConfig) -> Result<()> {
    let vault = open_vault()?;
    let records = vault.records()?;

    println!();
    println!("{}", "Deposits".yellow().bold());
    println!();

    if records.is_empty() {
        println!("  No deposits stored.");
        println!("  Run 'mixer identity --recipient <address>' to create one.");
        return Ok(());
    }

    let now = Utc::now();
    for record in &records {
        let expiry = next_utc_midnight(record.deposit_timestamp);
        let status = match &record.withdrawal_tx_hash {
            Some(tx) => format!("withdrawn in {}", tx).green(),
            None if now >= expiry => "ready".cyan(),
            None => format!("waiting ({} left)", Countdown::from_duration(expiry - now)).normal(),
        };

        println!("{}  {}", record.id().bold(), status);
        println!("  Recipient: {}", record.recipient_address);
        println!("  Deposited: {}", record.deposit_timestamp.to_rfc3339());
        println!("  Expiry:    {}", expiry.to_rfc3339());
        println!();
    }

    if !config.timer.production {
        println!(
            "{}",
            format!(
                "Development timer: withdrawals start {}s after 'mixer withdraw' for deposits not yet past expiry.",
                config.timer.fixed_delay_seconds
            )
            .dimmed()
        );
    }

    Ok(())
}
