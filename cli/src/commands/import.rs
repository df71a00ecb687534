//! Import deposit records created elsewhere

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::commands::open_vault;
use crate::store::{DepositRecord, DepositRecordStore, StoreError};
use crate::types::is_valid_address;

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    One(DepositRecord),
    Many(Vec<DepositRecord>),
}

/// Parse a file holding one record or an array of records
pub fn parse_records(json: &str) -> Result<Vec<DepositRecord>> {
    let records = match serde_json::from_str(json).context("Failed to parse deposit records")? {
        ImportFile::One(record) => vec![record],
        ImportFile::Many(records) => records,
    };

    for record in &records {
        if !is_valid_address(&record.recipient_address) {
            bail!(
                "Deposit {} has an invalid recipient address: {}",
                record.id(),
                record.recipient_address
            );
        }
    }

    Ok(records)
}

pub fn run(file: &Path) -> Result<()> {
    let json = Zeroizing::new(
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?,
    );
    let records = parse_records(&json)?;
    if records.is_empty() {
        println!("{}", "No deposit records in file.".yellow());
        return Ok(());
    }

    let vault = open_vault()?;
    let mut imported = 0;

    for record in records {
        let id = record.id();
        match vault.insert(record) {
            Ok(()) => {
                println!("  {} {}", "imported".green(), id);
                imported += 1;
            }
            Err(StoreError::Duplicate(_)) => println!("  {} {}", "skipped (already stored)".yellow(), id),
            Err(e) => return Err(e.into()),
        }
    }

    println!();
    println!("{}", format!("Imported {} deposit(s).", imported).green().bold());
    println!(
        "{}",
        "The source file still holds the identity keys in plaintext. Delete it.".red()
    );

    Ok(())
}
