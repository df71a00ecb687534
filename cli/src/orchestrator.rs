//! Withdrawal orchestrator
//!
//! Composes the timer gate, the proof pipeline and the submission client
//! for one deposit record.
//!
//! ```text
//! Idle ──activate──▶ AwaitingExpiry ──expiry / manual──▶ Proving ──▶ Submitting ──▶ Succeeded
//!   └──────────────── manual ─────────────────────────────┘   │            │
//!                                                             └────────────┴──▶ Failed(kind)
//! ```
//!
//! A one-shot latch is taken on the way into `Proving`. Whichever trigger
//! takes it first runs the attempt; every later trigger is ignored, and a
//! terminal state is never left.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::ErrorKind;
use crate::pipeline::{ProofPipeline, Stage};
use crate::relayer::SubmissionClient;
use crate::store::{DepositRecord, DepositRecordStore};
use crate::timer::{Clock, Countdown, ExpiryEvent, GateConfig, TimerGate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    AwaitingExpiry,
    Proving,
    Submitting,
    Succeeded { tx_hash: String },
    Failed(ErrorKind),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded { .. } | AttemptState::Failed(_))
    }

    pub fn in_flight(&self) -> bool {
        matches!(self, AttemptState::Proving | AttemptState::Submitting)
    }
}

/// What observers see: state, current stage, and at most one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: AttemptState,
    pub progress: Option<Stage>,
    pub message: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: AttemptState::Idle,
            progress: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Expiry(ExpiryEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The latch is taken: an attempt is running or has finished
    AlreadyStarted,
    /// Expiry of an already-past deposit while automatic withdrawal is off
    PolicyNotSatisfied,
    /// The chain context is unusable; the latch was left free
    Connection(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The attempt ran to the contained terminal state
    Started(AttemptState),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub gate: GateConfig,
    pub auto_withdraw_past_deposits: bool,
    pub tick_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            auto_withdraw_past_deposits: false,
            tick_interval: Duration::from_secs(1),
        }
    }
}

const PAST_DEPOSIT_MESSAGE: &str =
    "This deposit is already past its withdrawal time. Start the withdrawal manually.";

pub struct WithdrawalOrchestrator {
    record: DepositRecord,
    pipeline: ProofPipeline,
    submission: SubmissionClient,
    store: Arc<dyn DepositRecordStore>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    latch: AtomicBool,
    gate: Mutex<Option<TimerGate>>,
    status: watch::Sender<StatusSnapshot>,
}

impl WithdrawalOrchestrator {
    pub fn new(
        record: DepositRecord,
        pipeline: ProofPipeline,
        submission: SubmissionClient,
        store: Arc<dyn DepositRecordStore>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        Self {
            record,
            pipeline,
            submission,
            store,
            clock,
            settings,
            latch: AtomicBool::new(false),
            gate: Mutex::new(None),
            status,
        }
    }

    pub fn record(&self) -> &DepositRecord {
        &self.record
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> AttemptState {
        self.status.borrow().state.clone()
    }

    pub fn has_started(&self) -> bool {
        self.latch.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Gate
    // ========================================================================

    fn gate(&self) -> MutexGuard<'_, Option<TimerGate>> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build the gate and leave `Idle`
    ///
    /// The gate is built on the first call only, so the expiry instant and the
    /// already-past classification use the first observation.
    pub fn activate(&self, now: DateTime<Utc>) -> AttemptState {
        if let Some(tx_hash) = &self.record.withdrawal_tx_hash {
            self.latch.store(true, Ordering::SeqCst);
            self.update(|s| {
                s.state = AttemptState::Succeeded {
                    tx_hash: tx_hash.clone(),
                };
                s.progress = None;
            });
            return self.state();
        }

        {
            let mut gate = self.gate();
            if gate.is_none() {
                let built = TimerGate::new(self.record.deposit_timestamp, now, self.settings.gate);
                info!(
                    deposit = %self.record.id(),
                    expiry = %built.expiry(),
                    already_past = built.is_already_past(),
                    "timer gate armed"
                );
                *gate = Some(built);
            }
        }

        self.update(|s| {
            if s.state == AttemptState::Idle {
                s.state = AttemptState::AwaitingExpiry;
            }
        });
        self.state()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.gate().as_ref().map(TimerGate::expiry)
    }

    pub fn is_already_past(&self) -> bool {
        self.gate().as_ref().map_or(false, TimerGate::is_already_past)
    }

    pub fn countdown(&self, now: DateTime<Utc>) -> Option<Countdown> {
        self.gate().as_ref().and_then(|g| g.remaining(now))
    }

    fn tick_gate(&self, now: DateTime<Utc>) -> Option<ExpiryEvent> {
        self.gate().as_mut().and_then(|g| g.tick(now))
    }

    fn gate_fired(&self) -> bool {
        self.gate().as_ref().map_or(false, TimerGate::has_fired)
    }

    // ========================================================================
    // Status
    // ========================================================================

    fn update<F: FnOnce(&mut StatusSnapshot)>(&self, change: F) {
        self.status.send_if_modified(|snapshot| {
            let before = snapshot.clone();
            change(snapshot);
            *snapshot != before
        });
    }

    fn publish_progress(&self, stage: Stage) {
        self.update(|s| s.progress = Some(stage));
    }

    /// Replace the current message
    fn publish_message(&self, message: String) {
        self.update(|s| s.message = Some(message));
    }

    // ========================================================================
    // Triggering
    // ========================================================================

    pub async fn trigger(&self, trigger: Trigger) -> TriggerOutcome {
        if self.latch.load(Ordering::SeqCst) {
            return TriggerOutcome::Ignored(IgnoreReason::AlreadyStarted);
        }

        if let Trigger::Expiry(ExpiryEvent::AlreadyPast { .. }) = trigger {
            if !self.settings.auto_withdraw_past_deposits {
                self.publish_message(PAST_DEPOSIT_MESSAGE.to_string());
                return TriggerOutcome::Ignored(IgnoreReason::PolicyNotSatisfied);
            }
        }

        if let Some(connection) = self.pipeline.chain().connection_error().await {
            let kind = connection.kind();
            warn!(deposit = %self.record.id(), error = %connection, "withdrawal blocked by connection error");
            self.publish_message(kind.message());
            return TriggerOutcome::Ignored(IgnoreReason::Connection(kind));
        }

        if self
            .latch
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return TriggerOutcome::Ignored(IgnoreReason::AlreadyStarted);
        }

        info!(deposit = %self.record.id(), ?trigger, "withdrawal attempt started");
        TriggerOutcome::Started(self.execute().await)
    }

    async fn execute(&self) -> AttemptState {
        let id = self.record.id();

        self.update(|s| {
            s.state = AttemptState::Proving;
            s.progress = None;
            s.message = None;
        });

        let progress = |stage: Stage| self.publish_progress(stage);
        let package = match self.pipeline.run(&self.record, &progress).await {
            Ok(package) => package,
            Err(e) => {
                error!(deposit = %id, error = %e, "proof pipeline failed");
                return self.fail(e.kind());
            }
        };

        self.update(|s| {
            s.state = AttemptState::Submitting;
            s.progress = Some(Stage::Submitting);
        });

        let tx_hash = match self.submission.submit(package).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!(deposit = %id, error = %e, "submission failed");
                return self.fail(e.kind());
            }
        };

        let store = Arc::clone(&self.store);
        let (record_id, recorded_hash) = (id.clone(), tx_hash.clone());
        match tokio::task::spawn_blocking(move || store.record_withdrawal(&record_id, &recorded_hash))
            .await
        {
            Ok(Ok(())) => info!(deposit = %id, %tx_hash, "withdrawal recorded"),
            Ok(Err(e)) => {
                error!(deposit = %id, %tx_hash, error = %e, "withdrawal succeeded but the deposit record was not updated")
            }
            Err(e) => {
                error!(deposit = %id, %tx_hash, error = %e, "withdrawal succeeded but the store task failed")
            }
        }

        let state = AttemptState::Succeeded { tx_hash };
        self.update(|s| {
            s.state = state.clone();
            s.progress = None;
        });
        state
    }

    fn fail(&self, kind: ErrorKind) -> AttemptState {
        let state = AttemptState::Failed(kind.clone());
        self.update(|s| {
            s.state = state.clone();
            s.progress = None;
            s.message = Some(kind.message());
        });
        state
    }

    /// Resolve once another caller's attempt reaches a terminal state
    pub async fn wait_for_terminal(&self) -> AttemptState {
        let mut rx = self.status.subscribe();
        loop {
            let state = rx.borrow_and_update().state.clone();
            if state.is_terminal() || rx.changed().await.is_err() {
                return state;
            }
        }
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Drive the gate and the manual trigger channel until the attempt ends
    ///
    /// Each message on `manual_rx` is a manual trigger. An expiry blocked by a
    /// connection error stays pending and is retried on every tick. Returns
    /// the terminal state, or the current state once nothing can start an
    /// attempt any more.
    pub async fn run(&self, mut manual_rx: mpsc::Receiver<()>) -> AttemptState {
        let state = self.activate(self.clock.now());
        if state.is_terminal() {
            return state;
        }

        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut pending: Option<ExpiryEvent> = None;
        let mut manual_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(event) = self.tick_gate(self.clock.now()) {
                        info!(deposit = %self.record.id(), ?event, "expiry reached");
                        pending = Some(event);
                    }

                    if let Some(event) = pending {
                        match self.trigger(Trigger::Expiry(event)).await {
                            TriggerOutcome::Started(state) => return state,
                            TriggerOutcome::Ignored(IgnoreReason::Connection(_)) => {}
                            TriggerOutcome::Ignored(IgnoreReason::PolicyNotSatisfied) => pending = None,
                            TriggerOutcome::Ignored(IgnoreReason::AlreadyStarted) => {
                                return self.wait_for_terminal().await
                            }
                        }
                    }
                }
                message = manual_rx.recv(), if manual_open => {
                    match message {
                        Some(()) => match self.trigger(Trigger::Manual).await {
                            TriggerOutcome::Started(state) => return state,
                            TriggerOutcome::Ignored(IgnoreReason::AlreadyStarted) => {
                                return self.wait_for_terminal().await
                            }
                            TriggerOutcome::Ignored(_) => {}
                        },
                        None => manual_open = false,
                    }
                }
            }

            if !manual_open && pending.is_none() && self.gate_fired() {
                return self.state();
            }
        }
    }
}
