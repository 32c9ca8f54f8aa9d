//! Vote record types and the on-chain status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Commitment;

/// Sentinel block number recorded for simulated anchors.
pub const SIMULATED_BLOCK_NUMBER: u64 = 999_999;

/// On-chain submission status of a vote record.
///
/// Statuses only move forward:
///
/// ```text
/// pending -> { exists | sent -> { success | failed } } | simulated | failed
/// ```
///
/// `success`, `exists` and `simulated` are terminal. `failed` may be
/// re-driven by the retry path; a terminal status is never reset to
/// `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnchainStatus {
    /// Commitment computed, no chain interaction yet
    Pending,
    /// Transaction broadcast, confirmation outstanding
    Sent,
    /// Commitment was already on-chain before we submitted
    Exists,
    /// Our transaction confirmed successfully
    Success,
    /// Receipt reported failure and no duplicate was found
    Failed,
    /// Recorded without any real chain interaction
    Simulated,
}

impl OnchainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnchainStatus::Pending => "pending",
            OnchainStatus::Sent => "sent",
            OnchainStatus::Exists => "exists",
            OnchainStatus::Success => "success",
            OnchainStatus::Failed => "failed",
            OnchainStatus::Simulated => "simulated",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OnchainStatus::Pending),
            "sent" => Some(OnchainStatus::Sent),
            "exists" => Some(OnchainStatus::Exists),
            "success" => Some(OnchainStatus::Success),
            "failed" => Some(OnchainStatus::Failed),
            "simulated" => Some(OnchainStatus::Simulated),
            _ => None,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    /// Same-state updates are allowed so reconciliation can refresh fields.
    pub fn can_transition(self, next: OnchainStatus) -> bool {
        use OnchainStatus::*;

        if self == next {
            return true;
        }

        match self {
            Pending => matches!(next, Sent | Exists | Simulated | Failed),
            Sent => matches!(next, Success | Failed | Exists),
            Failed => matches!(next, Sent | Exists | Success | Simulated),
            Success | Exists | Simulated => false,
        }
    }

    /// The commitment is verifiably on-chain.
    pub fn is_anchored(&self) -> bool {
        matches!(self, OnchainStatus::Success | OnchainStatus::Exists)
    }

    /// The record still needs (or may need) chain reconciliation.
    pub fn needs_anchor(&self) -> bool {
        matches!(
            self,
            OnchainStatus::Pending | OnchainStatus::Sent | OnchainStatus::Failed
        )
    }
}

impl std::fmt::Display for OnchainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vote record as stored in the ledger.
///
/// Business fields (`election_id`, `candidate_id`, `cast_at`) are written
/// once at cast time; the orchestrator only ever mutates the on-chain
/// fields. The voter is deliberately absent: the (election, voter) pairing
/// lives in [`Participation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: Uuid,
    pub election_id: Uuid,
    pub candidate_id: Uuid,
    pub cast_at: DateTime<Utc>,
    pub commitment: Option<Commitment>,
    pub onchain_status: OnchainStatus,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub commitment_sender: Option<String>,
    pub anchor_attempts: u32,
}

impl VoteRecord {
    pub fn new(election_id: Uuid, candidate_id: Uuid, commitment: Option<Commitment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            election_id,
            candidate_id,
            cast_at: Utc::now(),
            commitment,
            onchain_status: OnchainStatus::Pending,
            tx_hash: None,
            block_number: None,
            commitment_sender: None,
            anchor_attempts: 0,
        }
    }
}

/// Per-(election, voter) participation row.
///
/// Carries the uniqueness constraint that prevents double voting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participation {
    pub id: Uuid,
    pub election_id: Uuid,
    pub voter_id: Uuid,
    pub has_voted: bool,
}

/// On-chain fields written by the orchestrator in a single atomic update.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct OnchainUpdate {
    pub status: OnchainStatus,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub commitment_sender: Option<String>,
}

impl OnchainUpdate {
    pub fn sent(tx_hash: String) -> Self {
        Self {
            status: OnchainStatus::Sent,
            tx_hash: Some(tx_hash),
            block_number: None,
            commitment_sender: None,
        }
    }

    pub fn success(tx_hash: String, block_number: Option<u64>, sender: String) -> Self {
        Self {
            status: OnchainStatus::Success,
            tx_hash: Some(tx_hash),
            block_number,
            commitment_sender: Some(sender),
        }
    }

    pub fn exists(block_number: Option<u64>, sender: Option<String>) -> Self {
        Self {
            status: OnchainStatus::Exists,
            tx_hash: None,
            block_number,
            commitment_sender: sender,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: OnchainStatus::Failed,
            tx_hash: None,
            block_number: None,
            commitment_sender: None,
        }
    }

    pub fn simulated(tx_hash: String, block_number: u64) -> Self {
        Self {
            status: OnchainStatus::Simulated,
            tx_hash: Some(tx_hash),
            block_number: Some(block_number),
            commitment_sender: None,
        }
    }
}

/// Caller-visible outcome of driving one vote through the anchoring state
/// machine. Each variant maps to a distinct user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnchorOutcome {
    /// Commitment submitted by this process and confirmed on-chain.
    Anchored {
        tx_hash: String,
        block_number: Option<u64>,
    },
    /// Commitment was already on-chain; provenance recorded.
    AlreadyOnChain {
        block_number: Option<u64>,
        sender: Option<String>,
    },
    /// Transaction broadcast but not yet confirmed.
    AwaitingConfirmation { tx_hash: String },
    /// Chain rejected the transaction and no duplicate was found.
    Rejected,
    /// No chain configuration; recorded locally with a placeholder id.
    Simulated { tx_hash: String },
}
