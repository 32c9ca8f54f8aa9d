//! Commitment and chain submission types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::infra::AnchorError;

/// Length of the canonical hex encoding: `0x` plus 64 nibbles.
pub const COMMITMENT_HEX_LEN: usize = 66;

/// A 32-byte vote commitment, rendered as 0x-prefixed lowercase hex.
///
/// The commitment is published on-chain and is not itself secret: it cannot
/// be reversed to the voter secret without guessing the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Commitment([u8; 32]);

impl Commitment {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical 66-character hex form, as stored in the ledger.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Commitment {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix("0x").ok_or_else(|| {
            AnchorError::InvalidCommitmentFormat(format!("missing 0x prefix: {s:?}"))
        })?;

        if s.len() != COMMITMENT_HEX_LEN {
            return Err(AnchorError::InvalidCommitmentFormat(format!(
                "expected {} characters, got {}",
                COMMITMENT_HEX_LEN,
                s.len()
            )));
        }

        let bytes = hex::decode(hex_part)
            .map_err(|e| AnchorError::InvalidCommitmentFormat(format!("invalid hex: {e}")))?;

        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AnchorError::InvalidCommitmentFormat("expected 32 bytes".to_string()))?;

        Ok(Self(bytes))
    }
}

impl Serialize for Commitment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Status reported by the chain client for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Broadcast, receipt not awaited
    Sent,
    /// Receipt confirmed success
    Success,
    /// Receipt reported failure
    Failed,
}

/// Transient result of one `storeCommitment` transaction.
///
/// Never persisted directly; the orchestrator maps it onto vote record
/// fields.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub status: SubmissionStatus,
}
