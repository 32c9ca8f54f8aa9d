//! REST API for the anchoring engine.

mod handlers;
mod types;

pub use types::*;

use axum::routing::{get, post};
use axum::Router;

use crate::server::AppState;

/// Build the API router, nested under `/api` by the server.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/votes", post(handlers::cast_vote))
        .route("/v1/votes/:vote_id", get(handlers::get_vote))
        .route("/v1/votes/:vote_id/anchor", post(handlers::anchor_vote))
        .route("/v1/chain/status", get(handlers::chain_status))
        .route(
            "/v1/commitments/:commitment/verify",
            get(handlers::verify_commitment),
        )
}
