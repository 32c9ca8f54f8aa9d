//! Error types for the anchoring engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while generating, persisting or anchoring a vote
/// commitment.
#[derive(Error, Debug)]
pub enum AnchorError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Vote record not found
    #[error("vote not found: {0}")]
    VoteNotFound(Uuid),

    /// The participation row already marks this voter as having voted
    #[error("voter {voter_id} has already voted in election {election_id}")]
    AlreadyVoted { election_id: Uuid, voter_id: Uuid },

    /// Malformed commitment inputs
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Commitment is not a 0x-prefixed 32-byte hex string
    #[error("invalid commitment format: {0}")]
    InvalidCommitmentFormat(String),

    /// Vote record carries no commitment to anchor
    #[error("vote {0} has no commitment")]
    MissingCommitment(Uuid),

    /// Chain endpoint unreachable or unresponsive
    #[error("chain connection error: {0}")]
    Connection(String),

    /// Required chain configuration is absent
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// Transaction broadcast but no receipt arrived within the timeout.
    /// The transaction cannot be retracted; the record stays reconcilable.
    #[error("transaction {tx_hash} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: String, timeout_secs: u64 },

    /// Contract reverted the transaction
    #[error("chain revert: {0}")]
    ChainRevert(String),

    /// On-chain status may only move forward through the state machine
    #[error("invalid status transition for vote {vote_id}: {from} -> {to}")]
    InvalidStateTransition {
        vote_id: Uuid,
        from: String,
        to: String,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl AnchorError {
    /// Whether retrying the operation may change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnchorError::Connection(_)
                | AnchorError::ConfirmationTimeout { .. }
                | AnchorError::ChainRevert(_)
                | AnchorError::Database(_)
        )
    }
}

/// Result type for anchoring operations.
pub type Result<T> = std::result::Result<T, AnchorError>;
