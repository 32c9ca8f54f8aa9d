//! Infrastructure layer for the anchoring engine.
//!
//! Contains trait definitions and implementations for:
//! - Vote ledger (PostgreSQL)
//! - Anchoring orchestrator (the on-chain status state machine)
//! - Retry policy (bounded exponential backoff)
//! - Anchor worker (background re-driving of unfinished votes)

mod error;
mod ledger;
mod orchestrator;
mod retry;
mod traits;
mod worker;

pub use error::*;
pub use ledger::PgVoteLedger;
pub use orchestrator::AnchoringOrchestrator;
pub use retry::{retry_with_policy, RetryConfig};
pub use traits::*;
pub use worker::{
    drive_vote, spawn_anchor_worker, AnchorWorker, AnchorWorkerConfig, SweepReport, WorkerMessage,
};
