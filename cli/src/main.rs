//! Mixer CLI - time-gated anonymous withdrawals through a relayer

#![allow(clippy::needless_borrows_for_generic_args)]
#![allow(clippy::needless_borrow)]
#![allow(clippy::redundant_closure)]
#![allow(dead_code)] // Public API items may not be used internally

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod artifacts;
mod chain;
mod commands;
mod config;
mod crypto;
mod error;
mod orchestrator;
mod pipeline;
mod primitives;
mod relayer;
mod secure_storage;
mod store;
mod timer;
mod types;


#[cfg(test)]
mod test_vectors;


#[cfg(test)]
mod integration_tests;

use commands::*;
use config::MixerConfig;

#[derive(Parser)]
#[command(name = "mixer")]
#[command(version = "0.1.0")]
#[command(about = "Time-gated anonymous withdrawals from an on-chain mixer")]
#[command(long_about = r#"
Withdraws a mixer deposit to its recipient through a relayer, so the
recipient never signs or pays for the withdrawal transaction.

A deposit becomes withdrawable at the first UTC midnight after it was
made. 'mixer withdraw' waits for that moment and then proves membership
and submits the proof; pressing Enter starts the withdrawal early.

Quick Start:
  1. mixer identity --recipient <address>   Create a deposit identity
  2. (deposit the printed identity commitment into the mixer)
  3. mixer status                           Check the countdown
  4. mixer withdraw                         Withdraw at expiry
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (default: ~/.mixer/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a deposit identity and store it in the encrypted vault
    Identity {
        /// Address that receives the withdrawal
        #[arg(short, long)]
        recipient: String,

        /// When the deposit was made, RFC 3339 (default: now)
        #[arg(long)]
        deposited_at: Option<String>,
    },

    /// Import deposit records from a JSON file
    Import {
        /// File holding one record or an array of records
        file: PathBuf,
    },

    /// List stored deposits
    Deposits,

    /// Show expiry and countdown for a deposit
    Status {
        /// Deposit id (default: the only pending deposit)
        #[arg(short, long)]
        deposit: Option<String>,
    },

    /// Withdraw a deposit at expiry (press Enter to start early)
    Withdraw {
        /// Deposit id (default: the only pending deposit)
        #[arg(short, long)]
        deposit: Option<String>,

        /// Start the withdrawal immediately
        #[arg(long)]
        now: bool,
    },

    /// Show the ether balance of an address (default: the deposit recipient)
    Balance {
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Show configuration and file locations
    Info,

    /// Write development proving artifacts (not zero-knowledge)
    DevArtifacts {
        /// Output directory (default: ~/.mixer/artifacts)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Merkle tree depth (default: artifacts.tree_depth)
        #[arg(long)]
        depth: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mixer=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = MixerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Identity {
            recipient,
            deposited_at,
        } => {
            identity::run(
                &config,
                identity::IdentityOptions {
                    recipient,
                    deposited_at,
                },
            )?;
        }
        Commands::Import { file } => {
            import::run(&file)?;
        }
        Commands::Deposits => {
            deposits::run(&config)?;
        }
        Commands::Status { deposit } => {
            status::run(&config, deposit.as_deref())?;
        }
        Commands::Withdraw { deposit, now } => {
            withdraw::run(&config, withdraw::WithdrawOptions { deposit, now }).await?;
        }
        Commands::Balance { address } => {
            balance::run(&config, address.as_deref()).await?;
        }
        Commands::Info => {
            info::run(&config, cli.config.as_deref())?;
        }
        Commands::DevArtifacts { out, depth } => {
            dev_artifacts::run(&config, out, depth)?;
        }
    }

    Ok(())
}
