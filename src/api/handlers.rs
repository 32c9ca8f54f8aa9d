//! REST API handlers for the anchoring engine.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::types::{
    CastVoteRequest, CastVoteResponse, VerifyCommitmentResponse, VoteStatusResponse,
};
use crate::crypto::generate_commitment;
use crate::domain::{AnchorOutcome, Commitment, VoteRecord};
use crate::infra::{AnchorError, CommitmentRegistry, VoteLedger};
use crate::server::AppState;

/// Map an engine error onto a status code and a user-facing message.
///
/// Voters see distinct messages for "already voted", "blockchain rejected"
/// and "network/config error"; these are never collapsed into one.
fn error_response(err: AnchorError) -> (StatusCode, String) {
    match &err {
        AnchorError::AlreadyVoted { .. } => (
            StatusCode::CONFLICT,
            "You have already voted in this election".to_string(),
        ),
        AnchorError::InvalidInput(_) | AnchorError::InvalidCommitmentFormat(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        AnchorError::VoteNotFound(_) | AnchorError::MissingCommitment(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        AnchorError::ChainRevert(_) => (
            StatusCode::BAD_GATEWAY,
            "The blockchain rejected this vote; it will be retried".to_string(),
        ),
        AnchorError::Connection(_) | AnchorError::MissingConfiguration(_) => (
            StatusCode::BAD_GATEWAY,
            "Blockchain network or configuration error; contact an administrator".to_string(),
        ),
        AnchorError::ConfirmationTimeout { .. } => (
            StatusCode::ACCEPTED,
            "Vote recorded; on-chain confirmation is still pending".to_string(),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn outcome_message(outcome: &AnchorOutcome) -> String {
    match outcome {
        AnchorOutcome::Anchored { block_number, .. } => match block_number {
            Some(block) => format!("Vote anchored on-chain at block {block}"),
            None => "Vote anchored on-chain".to_string(),
        },
        AnchorOutcome::AlreadyOnChain { .. } => {
            "This commitment was already anchored on-chain".to_string()
        }
        AnchorOutcome::AwaitingConfirmation { .. } => {
            "Vote recorded; on-chain confirmation is still pending".to_string()
        }
        AnchorOutcome::Rejected => {
            "The blockchain rejected this vote; it will be retried".to_string()
        }
        AnchorOutcome::Simulated { .. } => {
            "Vote recorded in simulated mode (blockchain not configured)".to_string()
        }
    }
}

/// POST /api/v1/votes - Cast a vote and anchor its commitment.
pub async fn cast_vote(
    State(state): State<AppState>,
    Json(request): Json<CastVoteRequest>,
) -> Result<Json<CastVoteResponse>, (StatusCode, String)> {
    let commitment = generate_commitment(
        &request.voter_secret,
        &request.election_id,
        &request.candidate_id,
        &state.server_salt,
    )
    .map_err(error_response)?;

    let vote = VoteRecord::new(request.election_id, request.candidate_id, Some(commitment));
    let vote_id = vote.id;

    state
        .ledger
        .record_vote(&vote, request.voter_id)
        .await
        .map_err(error_response)?;

    // The voter's request blocks until the chain settles or times out; a
    // timeout leaves the record in `sent` for the retry worker.
    let outcome = state
        .orchestrator
        .anchor_vote_or_simulate(vote_id)
        .await
        .map_err(error_response)?;

    let status = match state.ledger.vote(vote_id).await.map_err(error_response)? {
        Some(vote) => vote.onchain_status,
        None => return Err((StatusCode::INTERNAL_SERVER_ERROR, "vote vanished".to_string())),
    };

    let message = outcome_message(&outcome);
    Ok(Json(CastVoteResponse {
        vote_id,
        commitment,
        status,
        outcome,
        message,
    }))
}

/// GET /api/v1/votes/:vote_id - Anchor status of a vote.
pub async fn get_vote(
    State(state): State<AppState>,
    Path(vote_id): Path<Uuid>,
) -> Result<Json<VoteStatusResponse>, (StatusCode, String)> {
    let vote = state
        .ledger
        .vote(vote_id)
        .await
        .map_err(error_response)?
        .ok_or((StatusCode::NOT_FOUND, format!("vote not found: {vote_id}")))?;

    Ok(Json(VoteStatusResponse {
        vote_id: vote.id,
        election_id: vote.election_id,
        candidate_id: vote.candidate_id,
        commitment: vote.commitment,
        status: vote.onchain_status,
        tx_hash: vote.tx_hash,
        block_number: vote.block_number,
        commitment_sender: vote.commitment_sender,
    }))
}

/// POST /api/v1/votes/:vote_id/anchor - Re-drive one vote through the
/// anchoring state machine.
pub async fn anchor_vote(
    State(state): State<AppState>,
    Path(vote_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let outcome = state
        .orchestrator
        .anchor_vote(vote_id)
        .await
        .map_err(error_response)?;

    let message = outcome_message(&outcome);
    Ok(Json(serde_json::json!({
        "vote_id": vote_id,
        "message": message,
        "result": outcome,
    })))
}

/// GET /api/v1/chain/status - Chain client status and account balance.
pub async fn chain_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(registry) = state.registry.as_ref() else {
        return Ok(Json(serde_json::json!({
            "configured": false,
            "message": "Chain client not configured. Set BLOCKCHAIN_PRIVATE_KEY and VOTING_REGISTRY_ADDRESS; votes are recorded as simulated",
        })));
    };

    let balance = registry.balance().await.map_err(error_response)?;

    Ok(Json(serde_json::json!({
        "configured": true,
        "account": registry.account_address().to_string(),
        "registry": registry.registry_address().to_string(),
        "chain_id": registry.chain_id(),
        "balance_wei": balance.wei.to_string(),
        "balance_native": balance.native,
    })))
}

/// GET /api/v1/commitments/:commitment/verify - On-chain existence check.
pub async fn verify_commitment(
    State(state): State<AppState>,
    Path(commitment): Path<String>,
) -> Result<Json<VerifyCommitmentResponse>, (StatusCode, String)> {
    let commitment: Commitment = commitment.parse().map_err(error_response)?;

    let registry = state.registry.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Chain client not configured".to_string(),
    ))?;

    let exists = registry
        .has_commitment(&commitment)
        .await
        .map_err(error_response)?;

    let (block_number, sender) = if exists {
        (
            registry
                .commitment_block(&commitment)
                .await
                .map_err(error_response)?,
            registry
                .commitment_sender(&commitment)
                .await
                .map_err(error_response)?
                .map(|a| a.to_string()),
        )
    } else {
        (None, None)
    };

    Ok(Json(VerifyCommitmentResponse {
        commitment,
        exists,
        block_number,
        sender,
    }))
}
