//! Anchor retry worker.
//!
//! Background service that re-drives unfinished vote records through the
//! anchoring orchestrator. Each sweep:
//!
//! 1. Selects `pending`/`sent` votes, plus `failed` votes still inside
//!    their attempt budget
//! 2. Runs every record through the same orchestrator state machine the
//!    live casting path uses
//! 3. Applies bounded exponential backoff to transient chain errors and
//!    settles exhausted records as `failed`
//!
//! # Configuration
//!
//! - `ANCHOR_RETRY_INTERVAL_SECS` - Sweep interval (default: 60)
//! - `ANCHOR_RETRY_BATCH_SIZE` - Max records per sweep (default: 25)
//! - `ANCHOR_RETRY_MAX_ATTEMPTS` - Attempt budget per record (default: 3)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::domain::AnchorOutcome;
use crate::infra::{
    retry_with_policy, AnchoringOrchestrator, Result, RetryConfig, VoteLedger,
};

/// Configuration for the anchor retry worker.
#[derive(Debug, Clone)]
pub struct AnchorWorkerConfig {
    /// How often to sweep for unfinished votes
    pub sweep_interval: Duration,
    /// Maximum records per sweep
    pub batch_size: i64,
    /// Backoff policy applied per record
    pub retry: RetryConfig,
}

impl Default for AnchorWorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            batch_size: 25,
            retry: RetryConfig::anchoring(),
        }
    }
}

impl AnchorWorkerConfig {
    /// Load configuration from environment.
    pub fn from_env() -> Self {
        let sweep_interval = std::env::var("ANCHOR_RETRY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        let batch_size = std::env::var("ANCHOR_RETRY_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(25);

        let max_attempts = std::env::var("ANCHOR_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        Self {
            sweep_interval,
            batch_size,
            retry: RetryConfig::anchoring().with_max_attempts(max_attempts),
        }
    }
}

/// Control messages for the worker.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run a sweep immediately
    ForceSweep,
    /// Shut the worker down
    Shutdown,
}

/// Per-sweep outcome counts, for operational monitoring.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: u32,
    pub anchored: u32,
    pub already_onchain: u32,
    pub simulated: u32,
    pub awaiting: u32,
    pub rejected: u32,
    pub errors: u32,
}

impl SweepReport {
    pub fn tally(&mut self, result: &Result<AnchorOutcome>) {
        self.processed += 1;
        match result {
            Ok(AnchorOutcome::Anchored { .. }) => self.anchored += 1,
            Ok(AnchorOutcome::AlreadyOnChain { .. }) => self.already_onchain += 1,
            Ok(AnchorOutcome::Simulated { .. }) => self.simulated += 1,
            Ok(AnchorOutcome::AwaitingConfirmation { .. }) => self.awaiting += 1,
            Ok(AnchorOutcome::Rejected) => self.rejected += 1,
            Err(_) => self.errors += 1,
        }
    }

    /// Records that did not reach a settled or recoverable outcome.
    pub fn failures(&self) -> u32 {
        self.rejected + self.errors
    }
}

/// Re-drive one vote with the retry policy, settling it as `failed` once
/// the attempt budget is exhausted on a transient error.
pub async fn drive_vote(
    orchestrator: &AnchoringOrchestrator,
    retry: &RetryConfig,
    vote_id: uuid::Uuid,
) -> Result<AnchorOutcome> {
    let result = retry_with_policy(
        retry,
        "anchor_vote",
        |e: &crate::infra::AnchorError| e.is_transient(),
        || orchestrator.anchor_vote(vote_id),
    )
    .await;

    if let Err(err) = &result {
        if err.is_transient() {
            if let Err(give_up_err) = orchestrator.give_up(vote_id).await {
                error!(
                    vote_id = %vote_id,
                    error = %give_up_err,
                    "failed to settle exhausted vote as failed"
                );
            }
        }
    }

    result
}

/// Anchor retry worker.
///
/// Runs as a background task alongside live vote casting; both paths share
/// the orchestrator, so a record raced by the other side is reclassified
/// through the exists-check rather than submitted twice.
pub struct AnchorWorker {
    config: AnchorWorkerConfig,
    orchestrator: Arc<AnchoringOrchestrator>,
    ledger: Arc<dyn VoteLedger>,
    control_tx: mpsc::Sender<WorkerMessage>,
    control_rx: mpsc::Receiver<WorkerMessage>,
}

impl AnchorWorker {
    pub fn new(
        config: AnchorWorkerConfig,
        orchestrator: Arc<AnchoringOrchestrator>,
        ledger: Arc<dyn VoteLedger>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(16);
        Self {
            config,
            orchestrator,
            ledger,
            control_tx,
            control_rx,
        }
    }

    /// Get a sender handle for controlling the worker.
    pub fn control_handle(&self) -> mpsc::Sender<WorkerMessage> {
        self.control_tx.clone()
    }

    /// Run the worker until shutdown.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            batch_size = self.config.batch_size,
            max_attempts = self.config.retry.max_attempts,
            "starting anchor retry worker"
        );

        let mut ticker = interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "anchor sweep failed");
                    }
                }
                Some(msg) = self.control_rx.recv() => {
                    match msg {
                        WorkerMessage::ForceSweep => {
                            info!("forcing anchor sweep");
                            if let Err(e) = self.sweep().await {
                                error!(error = %e, "forced anchor sweep failed");
                            }
                        }
                        WorkerMessage::Shutdown => {
                            info!("anchor retry worker shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Run one sweep over unfinished votes.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let votes = self
            .ledger
            .votes_needing_anchor(self.config.batch_size, true, self.config.retry.max_attempts)
            .await?;

        if votes.is_empty() {
            debug!("no votes need anchoring");
            return Ok(SweepReport::default());
        }

        info!(count = votes.len(), "re-driving unfinished votes");

        let mut report = SweepReport::default();
        for vote in votes {
            let result = drive_vote(&self.orchestrator, &self.config.retry, vote.id).await;
            if let Err(err) = &result {
                warn!(vote_id = %vote.id, error = %err, "vote re-drive failed");
            }
            report.tally(&result);
        }

        info!(
            processed = report.processed,
            anchored = report.anchored,
            already_onchain = report.already_onchain,
            simulated = report.simulated,
            awaiting = report.awaiting,
            rejected = report.rejected,
            errors = report.errors,
            "anchor sweep complete"
        );

        Ok(report)
    }
}

/// Spawn the worker as a background task.
pub fn spawn_anchor_worker(
    config: AnchorWorkerConfig,
    orchestrator: Arc<AnchoringOrchestrator>,
    ledger: Arc<dyn VoteLedger>,
) -> (tokio::task::JoinHandle<()>, mpsc::Sender<WorkerMessage>) {
    let worker = AnchorWorker::new(config, orchestrator, ledger);
    let control_handle = worker.control_handle();
    let handle = tokio::spawn(worker.run());
    (handle, control_handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AnchorWorkerConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn report_tallies_outcomes() {
        let mut report = SweepReport::default();
        report.tally(&Ok(AnchorOutcome::Anchored {
            tx_hash: "0x1".into(),
            block_number: Some(1),
        }));
        report.tally(&Ok(AnchorOutcome::AlreadyOnChain {
            block_number: None,
            sender: None,
        }));
        report.tally(&Ok(AnchorOutcome::Rejected));
        report.tally(&Err(crate::infra::AnchorError::Connection("down".into())));

        assert_eq!(report.processed, 4);
        assert_eq!(report.anchored, 1);
        assert_eq!(report.already_onchain, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.failures(), 2);
    }
}
