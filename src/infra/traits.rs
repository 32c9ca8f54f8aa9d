//! Trait seams for the anchoring engine core services.

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::domain::{Commitment, OnchainUpdate, SubmissionResult, VoteRecord};

use super::Result;

/// Vote ledger: the relational store of vote records.
///
/// Invariant: the orchestrator only ever touches the on-chain fields;
/// business fields (election, candidate, timestamp) are written once at
/// cast time and never again.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VoteLedger: Send + Sync {
    /// Insert a vote row and mark the voter's participation in a single
    /// transaction.
    ///
    /// Fails with `AlreadyVoted` when the participation row already records
    /// a vote for this (election, voter) pair. The uniqueness constraint
    /// lives in the ledger, not in the orchestrator.
    async fn record_vote(&self, vote: &VoteRecord, voter_id: Uuid) -> Result<()>;

    /// Read a vote by id.
    async fn vote(&self, vote_id: Uuid) -> Result<Option<VoteRecord>>;

    /// Votes whose status still needs chain reconciliation, oldest first.
    ///
    /// `pending` and `sent` records are always included; `failed` records
    /// only when `include_failed` is set and their attempt count is below
    /// `max_attempts`.
    async fn votes_needing_anchor(
        &self,
        limit: i64,
        include_failed: bool,
        max_attempts: u32,
    ) -> Result<Vec<VoteRecord>>;

    /// Apply an on-chain update atomically, enforcing the forward-only
    /// state machine. A transition the state machine forbids fails with
    /// `InvalidStateTransition` and leaves the row untouched.
    async fn finalize_anchor(&self, vote_id: Uuid, update: OnchainUpdate) -> Result<()>;
}

/// Read/write operations against the on-chain voting registry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommitmentRegistry: Send + Sync {
    /// Whether the registry already holds this commitment. View call, costs
    /// no gas.
    async fn has_commitment(&self, commitment: &Commitment) -> Result<bool>;

    /// Inclusion block of the commitment, if present.
    async fn commitment_block(&self, commitment: &Commitment) -> Result<Option<u64>>;

    /// Account that originally stored the commitment, if present.
    async fn commitment_sender(&self, commitment: &Commitment) -> Result<Option<Address>>;

    /// Sign and broadcast a `storeCommitment` transaction.
    ///
    /// With `wait_for_receipt` the call blocks until the receipt arrives or
    /// `timeout` elapses (`ConfirmationTimeout`); without it the result
    /// carries status `sent` and no block number.
    async fn submit_commitment(
        &self,
        commitment: &Commitment,
        wait_for_receipt: bool,
        timeout: Duration,
    ) -> Result<SubmissionResult>;

    /// Public address of the signing account.
    fn account_address(&self) -> Address;
}
