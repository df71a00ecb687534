//! Expiry and countdown for one deposit

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use crate::commands::{open_vault, select_record};
use crate::config::MixerConfig;
use crate::timer::TimerGate;

pub fn run(config: &MixerConfig, deposit: Option<&str>) -> Result<()> {
    let vault = open_vault()?;
    let record = select_record(&vault, deposit)?;

    println!();
    println!("{} {}", "Deposit".yellow().bold(), record.id().bold());
    println!();
    println!("  Recipient: {}", record.recipient_address);
    println!("  Deposited: {}", record.deposit_timestamp.to_rfc3339());

    if let Some(tx) = &record.withdrawal_tx_hash {
        println!();
        println!("{}", "Withdrawn".green().bold());
        println!("  Transaction: {}", tx);
        return Ok(());
    }

    let now = Utc::now();
    let gate = TimerGate::new(record.deposit_timestamp, now, config.gate_config());
    println!("  Expiry:    {}", gate.expiry().to_rfc3339());
    println!();

    match gate.remaining(now) {
        Some(countdown) => {
            println!("{} {}", "Time left:".cyan(), countdown);
            println!(
                "{}",
                "'mixer withdraw' waits for expiry; press Enter there to withdraw early.".dimmed()
            );
        }
        None if gate.is_already_past() => {
            println!("{}", "Ready: the deposit is past its expiry.".green());
            println!("{}", "Run 'mixer withdraw --now' to withdraw.".dimmed());
        }
        None => println!("{}", "Ready to withdraw.".green()),
    }

    Ok(())
}
