//! PostgreSQL-backed vote ledger.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{
    Commitment, OnchainStatus, OnchainUpdate, Participation, VoteRecord,
};
use crate::infra::{AnchorError, Result, VoteLedger};

/// Vote ledger on PostgreSQL.
///
/// Owns the `votes` and `participations` tables; the uniqueness constraint
/// on (election_id, voter_id) is what makes double voting impossible.
pub struct PgVoteLedger {
    pool: PgPool,
}

impl PgVoteLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Read the participation row for one (election, voter) pair.
    pub async fn participation(
        &self,
        election_id: Uuid,
        voter_id: Uuid,
    ) -> Result<Option<Participation>> {
        let row: Option<(Uuid, Uuid, Uuid, bool)> = sqlx::query_as(
            r#"
            SELECT id, election_id, voter_id, has_voted
            FROM participations
            WHERE election_id = $1 AND voter_id = $2
            "#,
        )
        .bind(election_id)
        .bind(voter_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, election_id, voter_id, has_voted)| Participation {
            id,
            election_id,
            voter_id,
            has_voted,
        }))
    }

    /// Vote counts per on-chain status, for operational monitoring.
    pub async fn status_counts(&self) -> Result<Vec<(OnchainStatus, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT onchain_status, COUNT(*) FROM votes GROUP BY onchain_status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| {
                let status = OnchainStatus::parse_str(&status).ok_or_else(|| {
                    AnchorError::Internal(format!("unknown onchain_status in ledger: {status}"))
                })?;
                Ok((status, count))
            })
            .collect()
    }
}

#[async_trait]
impl VoteLedger for PgVoteLedger {
    async fn record_vote(&self, vote: &VoteRecord, voter_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // The DO UPDATE branch is filtered to rows that have not voted yet;
        // zero affected rows therefore means a second ballot for this pair.
        let marked = sqlx::query(
            r#"
            INSERT INTO participations (id, election_id, voter_id, has_voted)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (election_id, voter_id)
            DO UPDATE SET has_voted = TRUE
            WHERE participations.has_voted = FALSE
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(vote.election_id)
        .bind(voter_id)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() == 0 {
            return Err(AnchorError::AlreadyVoted {
                election_id: vote.election_id,
                voter_id,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO votes (
                id, election_id, candidate_id, cast_at,
                commitment, onchain_status, tx_hash, block_number,
                commitment_sender, anchor_attempts
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(vote.id)
        .bind(vote.election_id)
        .bind(vote.candidate_id)
        .bind(vote.cast_at)
        .bind(vote.commitment.map(|c| c.to_hex()))
        .bind(vote.onchain_status.as_str())
        .bind(&vote.tx_hash)
        .bind(vote.block_number.map(|b| b as i64))
        .bind(&vote.commitment_sender)
        .bind(vote.anchor_attempts as i32)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn vote(&self, vote_id: Uuid) -> Result<Option<VoteRecord>> {
        let row: Option<VoteRow> = sqlx::query_as(
            r#"
            SELECT id, election_id, candidate_id, cast_at,
                   commitment, onchain_status, tx_hash, block_number,
                   commitment_sender, anchor_attempts
            FROM votes
            WHERE id = $1
            "#,
        )
        .bind(vote_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VoteRecord::try_from).transpose()
    }

    async fn votes_needing_anchor(
        &self,
        limit: i64,
        include_failed: bool,
        max_attempts: u32,
    ) -> Result<Vec<VoteRecord>> {
        let rows: Vec<VoteRow> = sqlx::query_as(
            r#"
            SELECT id, election_id, candidate_id, cast_at,
                   commitment, onchain_status, tx_hash, block_number,
                   commitment_sender, anchor_attempts
            FROM votes
            WHERE commitment IS NOT NULL
              AND (
                  onchain_status IN ('pending', 'sent')
                  OR ($2 AND onchain_status = 'failed' AND anchor_attempts < $3)
              )
            ORDER BY cast_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(include_failed)
        .bind(max_attempts as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VoteRecord::try_from).collect()
    }

    async fn finalize_anchor(&self, vote_id: Uuid, update: OnchainUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT onchain_status FROM votes WHERE id = $1 FOR UPDATE")
                .bind(vote_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (current,) = row.ok_or(AnchorError::VoteNotFound(vote_id))?;
        let current = OnchainStatus::parse_str(&current).ok_or_else(|| {
            AnchorError::Internal(format!("unknown onchain_status in ledger: {current}"))
        })?;

        if !current.can_transition(update.status) {
            return Err(AnchorError::InvalidStateTransition {
                vote_id,
                from: current.as_str().to_string(),
                to: update.status.as_str().to_string(),
            });
        }

        let attempt_bump = i32::from(update.status == OnchainStatus::Failed);

        sqlx::query(
            r#"
            UPDATE votes
            SET onchain_status = $2,
                tx_hash = COALESCE($3, tx_hash),
                block_number = COALESCE($4, block_number),
                commitment_sender = COALESCE($5, commitment_sender),
                anchor_attempts = anchor_attempts + $6
            WHERE id = $1
            "#,
        )
        .bind(vote_id)
        .bind(update.status.as_str())
        .bind(&update.tx_hash)
        .bind(update.block_number.map(|b| b as i64))
        .bind(&update.commitment_sender)
        .bind(attempt_bump)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Raw row from the votes table.
#[derive(Debug, sqlx::FromRow)]
struct VoteRow {
    id: Uuid,
    election_id: Uuid,
    candidate_id: Uuid,
    cast_at: chrono::DateTime<chrono::Utc>,
    commitment: Option<String>,
    onchain_status: String,
    tx_hash: Option<String>,
    block_number: Option<i64>,
    commitment_sender: Option<String>,
    anchor_attempts: i32,
}

impl TryFrom<VoteRow> for VoteRecord {
    type Error = AnchorError;

    fn try_from(row: VoteRow) -> Result<Self> {
        let commitment = row
            .commitment
            .map(|c| c.trim().parse::<Commitment>())
            .transpose()?;

        let onchain_status = OnchainStatus::parse_str(&row.onchain_status).ok_or_else(|| {
            AnchorError::Internal(format!(
                "unknown onchain_status in ledger: {}",
                row.onchain_status
            ))
        })?;

        Ok(VoteRecord {
            id: row.id,
            election_id: row.election_id,
            candidate_id: row.candidate_id,
            cast_at: row.cast_at,
            commitment,
            onchain_status,
            tx_hash: row.tx_hash,
            block_number: row.block_number.map(|b| b as u64),
            commitment_sender: row.commitment_sender,
            anchor_attempts: row.anchor_attempts.max(0) as u32,
        })
    }
}
