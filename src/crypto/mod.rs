//! Vote commitment hashing.
//!
//! A commitment binds (voter secret, election, candidate, server salt) into
//! a single Keccak-256 digest. Keccak-256 matches the hashing domain of the
//! registry contract, so anyone holding the secret can recompute and verify
//! a published commitment. The secret itself never leaves this computation.

use alloy::primitives::keccak256;
use uuid::Uuid;

use crate::domain::Commitment;
use crate::infra::{AnchorError, Result};

/// Default server-side salt mixed into every commitment preimage.
/// Overridable via `VOTE_SERVER_SALT`.
pub const DEFAULT_SERVER_SALT: &str = "VOTING_SALT_2025";

/// Separator between preimage fields.
const FIELD_SEPARATOR: char = ':';

/// Compute the commitment for one ballot.
///
/// Preimage layout is fixed as `secret:election:candidate:salt`, with the
/// identifiers in their canonical hyphenated lowercase form. Changing the
/// layout would orphan every commitment already stored on-chain.
///
/// Deterministic and side-effect free; identical inputs always produce the
/// identical 66-character hex digest.
pub fn generate_commitment(
    voter_secret: &str,
    election_id: &Uuid,
    candidate_id: &Uuid,
    server_salt: &str,
) -> Result<Commitment> {
    if voter_secret.is_empty() {
        return Err(AnchorError::InvalidInput(
            "voter secret must not be empty".to_string(),
        ));
    }
    if server_salt.is_empty() {
        return Err(AnchorError::InvalidInput(
            "server salt must not be empty".to_string(),
        ));
    }

    let preimage = format!(
        "{voter_secret}{FIELD_SEPARATOR}{election_id}{FIELD_SEPARATOR}{candidate_id}{FIELD_SEPARATOR}{server_salt}"
    );

    Ok(Commitment::from_bytes(keccak256(preimage.as_bytes()).0))
}
