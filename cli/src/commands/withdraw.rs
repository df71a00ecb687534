//! Withdraw a deposit once its timer expires, or earlier on request

use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use colored::Colorize;
use tokio::sync::{mpsc, watch};

use crate::artifacts::ArtifactFetcher;
use crate::commands::{open_vault, select_record};
use crate::config::{format_ether, MixerConfig};
use crate::crypto::DevPrimitives;
use crate::orchestrator::{
    AttemptState, OrchestratorSettings, StatusSnapshot, WithdrawalOrchestrator,
};
use crate::pipeline::ProofPipeline;
use crate::relayer::{HttpRelayerTransport, SubmissionClient};
use crate::timer::SystemClock;

pub struct WithdrawOptions {
    /// Deposit id (default: the only pending deposit)
    pub deposit: Option<String>,
    /// Start immediately instead of waiting for expiry
    pub now: bool,
}

pub async fn run(config: &MixerConfig, options: WithdrawOptions) -> Result<()> {
    let vault = Arc::new(open_vault()?);
    let record = select_record(vault.as_ref(), options.deposit.as_deref())?;

    let timeout = Duration::from_secs(config.relayer.timeout_secs);
    let chain = Arc::new(config.chain(config.mixer_address()?)?);
    let artifacts = Arc::new(ArtifactFetcher::new(&config.artifacts, timeout)?);
    let primitives = Arc::new(DevPrimitives::new(config.artifacts.tree_depth));
    let fee_wei = config.fee_wei()?;

    println!("{}", "Preparing withdrawal...".cyan());
    println!("  Deposit:     {}", record.id());
    println!("  Recipient:   {}", record.recipient_address);
    println!("  Relayer fee: {} ETH", format_ether(&fee_wei));

    let pipeline = ProofPipeline::new(
        primitives,
        chain,
        artifacts,
        config.broadcaster_address()?,
        fee_wei,
    );
    let transport = Arc::new(HttpRelayerTransport::new(&config.relayer.url, timeout)?);
    let submission = SubmissionClient::new(transport);

    let settings = OrchestratorSettings {
        gate: config.gate_config(),
        auto_withdraw_past_deposits: config.timer.auto_withdraw_past_deposits,
        tick_interval: Duration::from_secs(config.timer.poll_interval_secs),
    };

    let orchestrator = WithdrawalOrchestrator::new(
        record,
        pipeline,
        submission,
        vault,
        Arc::new(SystemClock),
        settings,
    );

    let state = orchestrator.activate(Utc::now());
    if let AttemptState::Succeeded { tx_hash } = state {
        println!();
        println!("{}", "This deposit was already withdrawn.".yellow());
        println!("  Transaction: {}", tx_hash);
        return Ok(());
    }

    println!();
    if let Some(expiry) = orchestrator.expiry() {
        println!("  Expiry:      {}", expiry.to_rfc3339());
    }
    match orchestrator.countdown(Utc::now()) {
        Some(countdown) => println!("  Time left:   {}", countdown),
        None if orchestrator.is_already_past() => {
            println!("  {}", "The deposit is already past its expiry.".yellow())
        }
        None => {}
    }
    println!();

    let (manual_tx, manual_rx) = mpsc::channel(4);
    if options.now {
        manual_tx.send(()).await?;
    } else {
        println!("{}", "Waiting for expiry. Press Enter to withdraw now.".dimmed());
    }

    forward_enter_presses(BufReader::new(io::stdin()), manual_tx)?;
    let printer = tokio::spawn(print_status(orchestrator.subscribe()));

    let state = orchestrator.run(manual_rx).await;

    // Let the printer flush the final snapshot before stopping it
    tokio::task::yield_now().await;
    printer.abort();

    println!();
    match state {
        AttemptState::Succeeded { tx_hash } => {
            println!("{}", "Withdrawal successful!".green().bold());
            println!("  Transaction: {}", tx_hash);
            Ok(())
        }
        AttemptState::Failed(kind) => {
            println!("{}", kind.message().red());
            bail!("Withdrawal failed")
        }
        _ => {
            println!(
                "{}",
                "No withdrawal was started. Run 'mixer withdraw --now' to withdraw.".yellow()
            );
            Ok(())
        }
    }
}

/// Forward every line read from `input` as a manual trigger
///
/// Runs on a plain thread. A read parked on the terminal must not keep the
/// runtime alive after the withdrawal has finished.
fn forward_enter_presses<R>(input: R, manual_tx: mpsc::Sender<()>) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("manual-trigger".into())
        .spawn(move || {
            for line in input.lines() {
                if line.is_err() || manual_tx.blocking_send(()).is_err() {
                    break;
                }
            }
        })
}

async fn print_status(mut status: watch::Receiver<StatusSnapshot>) {
    let mut last = StatusSnapshot::default();

    while status.changed().await.is_ok() {
        let snapshot = status.borrow_and_update().clone();

        if snapshot.progress != last.progress {
            if let Some(stage) = snapshot.progress {
                println!("  {} {}", "->".cyan(), stage);
            }
        }
        if snapshot.message != last.message && !snapshot.state.is_terminal() {
            if let Some(message) = &snapshot.message {
                println!("  {}", message.yellow());
            }
        }

        last = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::mpsc as std_mpsc;
    use std::time::Instant;

    /// Input that blocks until released, like an idle terminal
    struct IdleTerminal(std_mpsc::Receiver<()>);

    impl Read for IdleTerminal {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_each_line_is_a_manual_trigger() {
        let (tx, mut rx) = mpsc::channel(4);
        forward_enter_presses(Cursor::new(b"\n\n".to_vec()), tx).unwrap();

        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, Some(()));
        // Sender goes away at end of input
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_idle_terminal_does_not_hold_runtime_open() {
        let (release, idle) = std_mpsc::channel();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, _rx) = mpsc::channel(1);

        runtime.block_on(async {
            forward_enter_presses(BufReader::new(IdleTerminal(idle)), tx).unwrap();
            tokio::task::yield_now().await;
        });

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(release);
    }
}
