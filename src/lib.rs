//! Vote commitment and on-chain anchoring engine.
//!
//! Voters' ballots are hashed into privacy-preserving Keccak-256
//! commitments and anchored to a public blockchain registry for
//! tamper-evidence.
//!
//! ## Modules
//!
//! - [`crypto`] - Deterministic commitment generation (no I/O)
//! - [`chain`] - JSON-RPC client for the VotingRegistry contract
//! - [`domain`] - Vote records, commitments and the status state machine
//! - [`infra`] - Vote ledger (PostgreSQL), orchestrator, retry worker
//! - [`api`] - REST API routes
//! - [`server`] - HTTP server bootstrap

pub mod api;
pub mod chain;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod migrations;
pub mod server;

// Re-export commonly used types
pub use domain::{
    AnchorOutcome, Commitment, OnchainStatus, OnchainUpdate, Participation, SubmissionResult,
    SubmissionStatus, VoteRecord,
};

pub use infra::{
    AnchorError, AnchoringOrchestrator, CommitmentRegistry, PgVoteLedger, Result, RetryConfig,
    VoteLedger,
};
