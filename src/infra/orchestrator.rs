//! Anchoring orchestrator.
//!
//! Drives a vote record through the on-chain status state machine:
//!
//! ```text
//! pending -> { exists | sent -> { success | failed } } | simulated | failed
//! ```
//!
//! The orchestrator is the only component that converts chain errors into a
//! persisted status; the chain client and the commitment generator raise
//! typed errors and never touch the ledger.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    AnchorOutcome, Commitment, OnchainStatus, OnchainUpdate, SubmissionStatus,
    SIMULATED_BLOCK_NUMBER,
};
use crate::infra::{AnchorError, CommitmentRegistry, Result, VoteLedger};

pub struct AnchoringOrchestrator {
    ledger: Arc<dyn VoteLedger>,
    registry: Option<Arc<dyn CommitmentRegistry>>,
    confirm_timeout: Duration,
}

impl AnchoringOrchestrator {
    /// `registry = None` means the chain is unconfigured or unreachable;
    /// every anchor request then resolves to `simulated`.
    pub fn new(
        ledger: Arc<dyn VoteLedger>,
        registry: Option<Arc<dyn CommitmentRegistry>>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            registry,
            confirm_timeout,
        }
    }

    pub fn is_simulating(&self) -> bool {
        self.registry.is_none()
    }

    /// Drive one vote through the state machine.
    ///
    /// Always leaves the record in a definite status before returning:
    /// terminal on the happy paths, `sent` when a broadcast transaction
    /// outlives the confirmation window.
    pub async fn anchor_vote(&self, vote_id: Uuid) -> Result<AnchorOutcome> {
        let vote = self
            .ledger
            .vote(vote_id)
            .await?
            .ok_or(AnchorError::VoteNotFound(vote_id))?;

        // Re-driving an already-settled record is a no-op.
        match vote.onchain_status {
            OnchainStatus::Success => {
                return Ok(AnchorOutcome::Anchored {
                    tx_hash: vote.tx_hash.unwrap_or_default(),
                    block_number: vote.block_number,
                });
            }
            OnchainStatus::Exists => {
                return Ok(AnchorOutcome::AlreadyOnChain {
                    block_number: vote.block_number,
                    sender: vote.commitment_sender,
                });
            }
            OnchainStatus::Simulated => {
                return Ok(AnchorOutcome::Simulated {
                    tx_hash: vote.tx_hash.unwrap_or_default(),
                });
            }
            OnchainStatus::Pending | OnchainStatus::Sent | OnchainStatus::Failed => {}
        }

        let commitment = vote
            .commitment
            .ok_or(AnchorError::MissingCommitment(vote_id))?;

        let Some(registry) = self.registry.clone() else {
            return self.mark_simulated(vote_id).await;
        };

        // Pre-flight existence check: a duplicate submission would only
        // revert and burn gas.
        if registry.has_commitment(&commitment).await? {
            return self.mark_exists(registry.as_ref(), vote_id, &commitment).await;
        }

        let result = match registry
            .submit_commitment(&commitment, true, self.confirm_timeout)
            .await
        {
            Ok(result) => result,
            Err(AnchorError::ConfirmationTimeout {
                tx_hash,
                timeout_secs,
            }) => {
                // The transaction cannot be retracted; keep the record in
                // `sent` so the retry path can reconcile it later.
                self.ledger
                    .finalize_anchor(vote_id, OnchainUpdate::sent(tx_hash.clone()))
                    .await?;
                warn!(vote_id = %vote_id, tx_hash = %tx_hash, "confirmation timed out, left in sent");
                return Err(AnchorError::ConfirmationTimeout {
                    tx_hash,
                    timeout_secs,
                });
            }
            Err(e) => return Err(e),
        };

        match result.status {
            SubmissionStatus::Success => {
                let sender = registry.account_address().to_string();
                self.ledger
                    .finalize_anchor(
                        vote_id,
                        OnchainUpdate::success(result.tx_hash.clone(), result.block_number, sender),
                    )
                    .await?;
                info!(
                    vote_id = %vote_id,
                    tx_hash = %result.tx_hash,
                    block_number = ?result.block_number,
                    "vote anchored"
                );
                Ok(AnchorOutcome::Anchored {
                    tx_hash: result.tx_hash,
                    block_number: result.block_number,
                })
            }
            SubmissionStatus::Sent => {
                self.ledger
                    .finalize_anchor(vote_id, OnchainUpdate::sent(result.tx_hash.clone()))
                    .await?;
                Ok(AnchorOutcome::AwaitingConfirmation {
                    tx_hash: result.tx_hash,
                })
            }
            SubmissionStatus::Failed => {
                // Race recovery: a failed receipt can mean someone else's
                // identical commitment landed first, since the contract
                // forbids duplicate storage. Re-check before declaring the
                // vote failed.
                if registry.has_commitment(&commitment).await? {
                    return self.mark_exists(registry.as_ref(), vote_id, &commitment).await;
                }

                self.ledger
                    .finalize_anchor(vote_id, OnchainUpdate::failed())
                    .await?;
                warn!(vote_id = %vote_id, tx_hash = %result.tx_hash, "chain rejected commitment");
                Ok(AnchorOutcome::Rejected)
            }
        }
    }

    /// Caller-path variant: a chain that is unreachable mid-flight degrades
    /// to `simulated` instead of failing the voter's request. The retry
    /// worker uses [`anchor_vote`](Self::anchor_vote) directly so the same
    /// condition surfaces as an operational failure there.
    pub async fn anchor_vote_or_simulate(&self, vote_id: Uuid) -> Result<AnchorOutcome> {
        match self.anchor_vote(vote_id).await {
            Err(err @ (AnchorError::Connection(_) | AnchorError::MissingConfiguration(_))) => {
                warn!(vote_id = %vote_id, error = %err, "chain unavailable, degrading to simulated");
                match self.mark_simulated(vote_id).await {
                    Ok(outcome) => Ok(outcome),
                    // A record that already progressed past pending cannot
                    // be simulated; surface the original failure.
                    Err(_) => Err(err),
                }
            }
            other => other,
        }
    }

    /// Persist a final `failed` status after the retry budget is exhausted.
    /// Records that settled in the meantime are left untouched.
    pub async fn give_up(&self, vote_id: Uuid) -> Result<()> {
        match self
            .ledger
            .finalize_anchor(vote_id, OnchainUpdate::failed())
            .await
        {
            Ok(()) => Ok(()),
            Err(AnchorError::InvalidStateTransition { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn mark_exists(
        &self,
        registry: &dyn CommitmentRegistry,
        vote_id: Uuid,
        commitment: &Commitment,
    ) -> Result<AnchorOutcome> {
        // Record provenance even though this account did not (necessarily)
        // submit the original transaction.
        let block_number = registry.commitment_block(commitment).await?;
        let sender = registry
            .commitment_sender(commitment)
            .await?
            .map(|a| a.to_string());

        self.ledger
            .finalize_anchor(
                vote_id,
                OnchainUpdate::exists(block_number, sender.clone()),
            )
            .await?;

        info!(
            vote_id = %vote_id,
            commitment = %commitment,
            block_number = ?block_number,
            "commitment already on-chain"
        );

        Ok(AnchorOutcome::AlreadyOnChain {
            block_number,
            sender,
        })
    }

    async fn mark_simulated(&self, vote_id: Uuid) -> Result<AnchorOutcome> {
        let tx_hash = format!("0x{}", Uuid::new_v4().simple());

        self.ledger
            .finalize_anchor(
                vote_id,
                OnchainUpdate::simulated(tx_hash.clone(), SIMULATED_BLOCK_NUMBER),
            )
            .await?;

        info!(vote_id = %vote_id, tx_hash = %tx_hash, "vote recorded in simulated mode");

        Ok(AnchorOutcome::Simulated { tx_hash })
    }
}
