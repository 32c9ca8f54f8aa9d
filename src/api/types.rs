//! Shared request and response types for REST API handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AnchorOutcome, Commitment, OnchainStatus};

/// Request body for casting a vote.
#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub election_id: Uuid,
    pub candidate_id: Uuid,
    pub voter_id: Uuid,
    /// Secret known only to the voter (e.g. a ballot PIN). Hashed into the
    /// commitment and never stored.
    pub voter_secret: String,
}

/// Response for a cast vote.
#[derive(Debug, Serialize)]
pub struct CastVoteResponse {
    pub vote_id: Uuid,
    pub commitment: Commitment,
    pub status: OnchainStatus,
    #[serde(flatten)]
    pub outcome: AnchorOutcome,
    pub message: String,
}

/// Anchor status of one vote record.
#[derive(Debug, Serialize)]
pub struct VoteStatusResponse {
    pub vote_id: Uuid,
    pub election_id: Uuid,
    pub candidate_id: Uuid,
    pub commitment: Option<Commitment>,
    pub status: OnchainStatus,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub commitment_sender: Option<String>,
}

/// On-chain verification of a commitment.
#[derive(Debug, Serialize)]
pub struct VerifyCommitmentResponse {
    pub commitment: Commitment,
    pub exists: bool,
    pub block_number: Option<u64>,
    pub sender: Option<String>,
}
