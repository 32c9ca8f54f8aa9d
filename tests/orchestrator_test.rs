//! Anchoring state machine tests against in-memory fakes.
//!
//! The fake registry models the deployed contract's behavior (duplicate
//! storage is impossible, reads are free) so the orchestrator's transitions
//! can be exercised without a chain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use uuid::Uuid;

use vote_anchor::domain::{
    AnchorOutcome, Commitment, OnchainStatus, OnchainUpdate, SubmissionResult, SubmissionStatus,
    VoteRecord, SIMULATED_BLOCK_NUMBER,
};
use vote_anchor::infra::{drive_vote, RetryConfig};
use vote_anchor::{AnchorError, AnchoringOrchestrator, CommitmentRegistry, VoteLedger};

type Result<T> = std::result::Result<T, AnchorError>;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeLedger {
    votes: Mutex<HashMap<Uuid, VoteRecord>>,
    participations: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl FakeLedger {
    fn stored(&self, vote_id: Uuid) -> VoteRecord {
        self.votes
            .lock()
            .unwrap()
            .get(&vote_id)
            .cloned()
            .expect("vote should exist")
    }
}

#[async_trait]
impl VoteLedger for FakeLedger {
    async fn record_vote(&self, vote: &VoteRecord, voter_id: Uuid) -> Result<()> {
        let mut participations = self.participations.lock().unwrap();
        if !participations.insert((vote.election_id, voter_id)) {
            return Err(AnchorError::AlreadyVoted {
                election_id: vote.election_id,
                voter_id,
            });
        }
        self.votes.lock().unwrap().insert(vote.id, vote.clone());
        Ok(())
    }

    async fn vote(&self, vote_id: Uuid) -> Result<Option<VoteRecord>> {
        Ok(self.votes.lock().unwrap().get(&vote_id).cloned())
    }

    async fn votes_needing_anchor(
        &self,
        limit: i64,
        include_failed: bool,
        max_attempts: u32,
    ) -> Result<Vec<VoteRecord>> {
        let votes = self.votes.lock().unwrap();
        let mut out: Vec<VoteRecord> = votes
            .values()
            .filter(|v| v.commitment.is_some())
            .filter(|v| match v.onchain_status {
                OnchainStatus::Pending | OnchainStatus::Sent => true,
                OnchainStatus::Failed => include_failed && v.anchor_attempts < max_attempts,
                _ => false,
            })
            .cloned()
            .collect();
        out.sort_by_key(|v| v.cast_at);
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn finalize_anchor(&self, vote_id: Uuid, update: OnchainUpdate) -> Result<()> {
        let mut votes = self.votes.lock().unwrap();
        let vote = votes
            .get_mut(&vote_id)
            .ok_or(AnchorError::VoteNotFound(vote_id))?;

        if !vote.onchain_status.can_transition(update.status) {
            return Err(AnchorError::InvalidStateTransition {
                vote_id,
                from: vote.onchain_status.as_str().to_string(),
                to: update.status.as_str().to_string(),
            });
        }

        vote.onchain_status = update.status;
        if let Some(tx_hash) = update.tx_hash {
            vote.tx_hash = Some(tx_hash);
        }
        if let Some(block_number) = update.block_number {
            vote.block_number = Some(block_number);
        }
        if let Some(sender) = update.commitment_sender {
            vote.commitment_sender = Some(sender);
        }
        if update.status == OnchainStatus::Failed {
            vote.anchor_attempts += 1;
        }
        Ok(())
    }
}

/// How the fake chain responds to submissions.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SubmitMode {
    /// Receipt success, commitment lands
    Confirm,
    /// Receipt failure, nothing lands
    FailReceipt,
    /// Receipt failure, but the commitment lands anyway (duplicate race)
    FailButLands,
    /// Confirmation wait times out; the transaction stays in flight
    Timeout,
    /// Network unreachable
    ConnectionError,
}

struct FakeRegistry {
    records: Mutex<HashMap<Commitment, (u64, Address)>>,
    mode: Mutex<SubmitMode>,
    submit_calls: AtomicU32,
    account: Address,
    next_block: AtomicU32,
}

impl FakeRegistry {
    fn new(mode: SubmitMode) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            mode: Mutex::new(mode),
            submit_calls: AtomicU32::new(0),
            account: Address::repeat_byte(0xAA),
            next_block: AtomicU32::new(100),
        }
    }

    fn preload(&self, commitment: Commitment, block: u64, sender: Address) {
        self.records
            .lock()
            .unwrap()
            .insert(commitment, (block, sender));
    }

    fn set_mode(&self, mode: SubmitMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn submissions(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitmentRegistry for FakeRegistry {
    async fn has_commitment(&self, commitment: &Commitment) -> Result<bool> {
        if *self.mode.lock().unwrap() == SubmitMode::ConnectionError {
            return Err(AnchorError::Connection("rpc unreachable".to_string()));
        }
        Ok(self.records.lock().unwrap().contains_key(commitment))
    }

    async fn commitment_block(&self, commitment: &Commitment) -> Result<Option<u64>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(commitment)
            .map(|(block, _)| *block))
    }

    async fn commitment_sender(&self, commitment: &Commitment) -> Result<Option<Address>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(commitment)
            .map(|(_, sender)| *sender))
    }

    async fn submit_commitment(
        &self,
        commitment: &Commitment,
        _wait_for_receipt: bool,
        timeout: Duration,
    ) -> Result<SubmissionResult> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let block = self.next_block.fetch_add(1, Ordering::SeqCst) as u64;
        let tx_hash = format!("0x{:064x}", block);

        match *self.mode.lock().unwrap() {
            SubmitMode::Confirm => {
                self.records
                    .lock()
                    .unwrap()
                    .insert(*commitment, (block, self.account));
                Ok(SubmissionResult {
                    tx_hash,
                    block_number: Some(block),
                    gas_used: Some(47_000),
                    status: SubmissionStatus::Success,
                })
            }
            SubmitMode::FailReceipt => Ok(SubmissionResult {
                tx_hash,
                block_number: Some(block),
                gas_used: Some(47_000),
                status: SubmissionStatus::Failed,
            }),
            SubmitMode::FailButLands => {
                self.records
                    .lock()
                    .unwrap()
                    .insert(*commitment, (block, Address::repeat_byte(0xBB)));
                Ok(SubmissionResult {
                    tx_hash,
                    block_number: Some(block),
                    gas_used: Some(47_000),
                    status: SubmissionStatus::Failed,
                })
            }
            SubmitMode::Timeout => Err(AnchorError::ConfirmationTimeout {
                tx_hash,
                timeout_secs: timeout.as_secs(),
            }),
            SubmitMode::ConnectionError => {
                Err(AnchorError::Connection("rpc unreachable".to_string()))
            }
        }
    }

    fn account_address(&self) -> Address {
        self.account
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn commitment(seed: u8) -> Commitment {
    Commitment::from_bytes([seed; 32])
}

async fn cast_vote(ledger: &FakeLedger, seed: u8) -> Uuid {
    let vote = VoteRecord::new(Uuid::new_v4(), Uuid::new_v4(), Some(commitment(seed)));
    let vote_id = vote.id;
    ledger.record_vote(&vote, Uuid::new_v4()).await.unwrap();
    vote_id
}

fn orchestrator(
    ledger: &Arc<FakeLedger>,
    registry: Option<&Arc<FakeRegistry>>,
) -> AnchoringOrchestrator {
    AnchoringOrchestrator::new(
        ledger.clone() as Arc<dyn VoteLedger>,
        registry.map(|r| r.clone() as Arc<dyn CommitmentRegistry>),
        Duration::from_secs(30),
    )
}

// ============================================================================
// Tests
// ============================================================================

/// Submit, confirm, then observe the commitment on-chain.
#[tokio::test]
async fn submitted_commitment_becomes_visible() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::Confirm));
    let vote_id = cast_vote(&ledger, 1).await;

    assert!(!registry.has_commitment(&commitment(1)).await.unwrap());

    let outcome = orchestrator(&ledger, Some(&registry))
        .anchor_vote(vote_id)
        .await
        .unwrap();

    assert!(matches!(outcome, AnchorOutcome::Anchored { .. }));
    assert!(registry.has_commitment(&commitment(1)).await.unwrap());

    let stored = ledger.stored(vote_id);
    assert_eq!(stored.onchain_status, OnchainStatus::Success);
    assert!(stored.tx_hash.is_some());
    assert_eq!(stored.block_number, Some(100));
    assert_eq!(
        stored.commitment_sender,
        Some(registry.account_address().to_string())
    );
}

/// A commitment already on-chain transitions the record to `exists` without
/// a chain write, recording the original sender.
#[tokio::test]
async fn existing_commitment_is_adopted_not_resubmitted() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::Confirm));
    let vote_id = cast_vote(&ledger, 2).await;

    let original_sender = Address::repeat_byte(0xCC);
    registry.preload(commitment(2), 42, original_sender);

    let outcome = orchestrator(&ledger, Some(&registry))
        .anchor_vote(vote_id)
        .await
        .unwrap();

    assert_eq!(registry.submissions(), 0);
    match outcome {
        AnchorOutcome::AlreadyOnChain {
            block_number,
            sender,
        } => {
            assert_eq!(block_number, Some(42));
            assert_eq!(sender, Some(original_sender.to_string()));
        }
        other => panic!("expected AlreadyOnChain, got {other:?}"),
    }

    let stored = ledger.stored(vote_id);
    assert_eq!(stored.onchain_status, OnchainStatus::Exists);
    assert_eq!(stored.commitment_sender, Some(original_sender.to_string()));
}

/// No chain configuration: the record resolves to `simulated` with a
/// placeholder transaction id, never to `success`.
#[tokio::test]
async fn unconfigured_chain_resolves_to_simulated() {
    let ledger = Arc::new(FakeLedger::default());
    let vote_id = cast_vote(&ledger, 3).await;

    let orchestrator = orchestrator(&ledger, None);
    assert!(orchestrator.is_simulating());

    let outcome = orchestrator.anchor_vote(vote_id).await.unwrap();

    match outcome {
        AnchorOutcome::Simulated { tx_hash } => {
            assert!(tx_hash.starts_with("0x"));
            assert_eq!(tx_hash.len(), 34);
        }
        other => panic!("expected Simulated, got {other:?}"),
    }

    let stored = ledger.stored(vote_id);
    assert_eq!(stored.onchain_status, OnchainStatus::Simulated);
    assert_ne!(stored.onchain_status, OnchainStatus::Success);
    assert_eq!(stored.block_number, Some(SIMULATED_BLOCK_NUMBER));
}

/// Receipt reports failure but the commitment is present on re-check: the
/// race-recovery rule classifies the record as `exists`, not `failed`.
#[tokio::test]
async fn failed_receipt_with_duplicate_is_exists() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::FailButLands));
    let vote_id = cast_vote(&ledger, 4).await;

    let outcome = orchestrator(&ledger, Some(&registry))
        .anchor_vote(vote_id)
        .await
        .unwrap();

    assert!(matches!(outcome, AnchorOutcome::AlreadyOnChain { .. }));

    let stored = ledger.stored(vote_id);
    assert_eq!(stored.onchain_status, OnchainStatus::Exists);
    assert_eq!(
        stored.commitment_sender,
        Some(Address::repeat_byte(0xBB).to_string())
    );
}

/// Receipt failure with no duplicate is a hard `failed`.
#[tokio::test]
async fn failed_receipt_without_duplicate_is_failed() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::FailReceipt));
    let vote_id = cast_vote(&ledger, 5).await;

    let outcome = orchestrator(&ledger, Some(&registry))
        .anchor_vote(vote_id)
        .await
        .unwrap();

    assert_eq!(outcome, AnchorOutcome::Rejected);

    let stored = ledger.stored(vote_id);
    assert_eq!(stored.onchain_status, OnchainStatus::Failed);
    assert_eq!(stored.anchor_attempts, 1);
}

/// A confirmation timeout surfaces as an error and leaves the record in
/// `sent` with its transaction hash, not `failed`.
#[tokio::test]
async fn timeout_leaves_record_in_sent() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::Timeout));
    let vote_id = cast_vote(&ledger, 6).await;

    let err = orchestrator(&ledger, Some(&registry))
        .anchor_vote(vote_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AnchorError::ConfirmationTimeout { .. }));

    let stored = ledger.stored(vote_id);
    assert_eq!(stored.onchain_status, OnchainStatus::Sent);
    assert!(stored.tx_hash.is_some());
}

/// A `sent` record whose transaction later landed reconciles to `exists`
/// without a second submission.
#[tokio::test]
async fn sent_record_reconciles_after_late_landing() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::Timeout));
    let vote_id = cast_vote(&ledger, 7).await;

    let orchestrator = orchestrator(&ledger, Some(&registry));
    orchestrator.anchor_vote(vote_id).await.unwrap_err();
    assert_eq!(ledger.stored(vote_id).onchain_status, OnchainStatus::Sent);

    // The in-flight transaction lands while nobody is watching.
    registry.preload(commitment(7), 77, registry.account_address());
    registry.set_mode(SubmitMode::Confirm);

    let outcome = orchestrator.anchor_vote(vote_id).await.unwrap();
    assert!(matches!(outcome, AnchorOutcome::AlreadyOnChain { .. }));
    assert_eq!(registry.submissions(), 1);
    assert_eq!(ledger.stored(vote_id).onchain_status, OnchainStatus::Exists);
}

/// Re-driving a settled record performs no further chain writes.
#[tokio::test]
async fn settled_record_is_idempotent() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::Confirm));
    let vote_id = cast_vote(&ledger, 8).await;

    let orchestrator = orchestrator(&ledger, Some(&registry));
    orchestrator.anchor_vote(vote_id).await.unwrap();
    assert_eq!(registry.submissions(), 1);

    let outcome = orchestrator.anchor_vote(vote_id).await.unwrap();
    assert!(matches!(outcome, AnchorOutcome::Anchored { .. }));
    assert_eq!(registry.submissions(), 1);
}

/// Two votes carrying the same commitment cannot both settle as `success`
/// from different accounts: the second is reclassified as `exists`.
#[tokio::test]
async fn same_commitment_twice_never_double_succeeds() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::Confirm));

    let first = cast_vote(&ledger, 9).await;
    let second = cast_vote(&ledger, 9).await;

    let orchestrator = orchestrator(&ledger, Some(&registry));
    orchestrator.anchor_vote(first).await.unwrap();
    let outcome = orchestrator.anchor_vote(second).await.unwrap();

    assert!(matches!(outcome, AnchorOutcome::AlreadyOnChain { .. }));
    assert_eq!(registry.submissions(), 1);
    assert_eq!(ledger.stored(first).onchain_status, OnchainStatus::Success);
    assert_eq!(ledger.stored(second).onchain_status, OnchainStatus::Exists);
}

/// The ledger's uniqueness constraint rejects a second ballot for the same
/// (election, voter) pair.
#[tokio::test]
async fn double_vote_is_rejected_by_ledger() {
    let ledger = FakeLedger::default();
    let election_id = Uuid::new_v4();
    let voter_id = Uuid::new_v4();

    let first = VoteRecord::new(election_id, Uuid::new_v4(), Some(commitment(10)));
    ledger.record_vote(&first, voter_id).await.unwrap();

    let second = VoteRecord::new(election_id, Uuid::new_v4(), Some(commitment(11)));
    let err = ledger.record_vote(&second, voter_id).await.unwrap_err();

    assert!(matches!(err, AnchorError::AlreadyVoted { .. }));
}

/// The caller path degrades a mid-flight connection failure to `simulated`.
#[tokio::test]
async fn caller_path_degrades_connection_failure_to_simulated() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::ConnectionError));
    let vote_id = cast_vote(&ledger, 12).await;

    let outcome = orchestrator(&ledger, Some(&registry))
        .anchor_vote_or_simulate(vote_id)
        .await
        .unwrap();

    assert!(matches!(outcome, AnchorOutcome::Simulated { .. }));
    assert_eq!(
        ledger.stored(vote_id).onchain_status,
        OnchainStatus::Simulated
    );
}

/// The retry path surfaces the connection failure and settles the record as
/// `failed` once the attempt budget is exhausted.
#[tokio::test]
async fn retry_exhaustion_settles_as_failed() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::ConnectionError));
    let vote_id = cast_vote(&ledger, 13).await;

    let orchestrator = orchestrator(&ledger, Some(&registry));
    let err = drive_vote(&orchestrator, &RetryConfig::fast(), vote_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AnchorError::Connection(_)));
    assert_eq!(ledger.stored(vote_id).onchain_status, OnchainStatus::Failed);
}

/// Terminal records never reappear in the retry queue.
#[tokio::test]
async fn retry_queue_excludes_settled_records() {
    let ledger = Arc::new(FakeLedger::default());
    let registry = Arc::new(FakeRegistry::new(SubmitMode::Confirm));

    let settled = cast_vote(&ledger, 14).await;
    let pending = cast_vote(&ledger, 15).await;

    orchestrator(&ledger, Some(&registry))
        .anchor_vote(settled)
        .await
        .unwrap();

    let queue = ledger.votes_needing_anchor(100, true, 3).await.unwrap();
    let ids: Vec<Uuid> = queue.iter().map(|v| v.id).collect();
    assert!(ids.contains(&pending));
    assert!(!ids.contains(&settled));
}
