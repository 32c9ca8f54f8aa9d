//! HTTP server bootstrap for the anchoring engine.
//!
//! This module wires together:
//! - configuration
//! - database connection pool and migrations
//! - the chain client (optional; absence means simulated mode)
//! - the anchoring orchestrator and retry worker
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::chain::{ChainConfig, RegistryClient};
use crate::crypto::DEFAULT_SERVER_SALT;
use crate::infra::{
    spawn_anchor_worker, AnchorWorkerConfig, AnchoringOrchestrator, CommitmentRegistry,
    PgVoteLedger, VoteLedger,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Server-side salt mixed into every commitment.
    pub server_salt: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/vote_anchor".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .expect("Invalid listen address");

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let server_salt = std::env::var("VOTE_SERVER_SALT")
            .unwrap_or_else(|_| DEFAULT_SERVER_SALT.to_string());

        Self {
            database_url,
            listen_addr,
            max_connections,
            server_salt,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<PgVoteLedger>,
    pub orchestrator: Arc<AnchoringOrchestrator>,
    pub registry: Option<Arc<RegistryClient>>,
    pub server_salt: String,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting vote-anchor v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Max connections: {}", config.max_connections);

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to PostgreSQL");

    let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
        .ok()
        .map(|v| {
            !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off"
            )
        })
        .unwrap_or(true);
    if migrate_on_startup {
        info!("Running database migrations...");
        crate::migrations::run_postgres(&pool).await?;
        info!("Database migrations applied");
    } else {
        info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
    }

    let ledger = Arc::new(PgVoteLedger::new(pool.clone()));

    // Chain client is optional: without it every vote resolves to the
    // simulated status, never to success.
    let (registry, confirm_timeout) = match ChainConfig::from_env() {
        Some(chain_config) => {
            let confirm_timeout = chain_config.confirm_timeout;
            info!("Chain client configured:");
            info!("  RPC URL: {}", chain_config.rpc_url);
            info!("  Registry: {}", chain_config.registry_address);
            match RegistryClient::connect(chain_config).await {
                Ok(client) => {
                    info!("  Account: {}", client.account_address());
                    info!("  Chain ID: {}", client.chain_id());
                    (Some(Arc::new(client)), confirm_timeout)
                }
                Err(e) => {
                    warn!(error = %e, "chain client unavailable, running in simulated mode");
                    (None, confirm_timeout)
                }
            }
        }
        None => {
            info!(
                "Chain client not configured (set BLOCKCHAIN_PRIVATE_KEY, VOTING_REGISTRY_ADDRESS to enable); running in simulated mode"
            );
            (None, crate::chain::DEFAULT_CONFIRM_TIMEOUT)
        }
    };

    let orchestrator = Arc::new(AnchoringOrchestrator::new(
        ledger.clone() as Arc<dyn VoteLedger>,
        registry
            .clone()
            .map(|r| r as Arc<dyn CommitmentRegistry>),
        confirm_timeout,
    ));

    let (_worker_handle, _worker_control) = spawn_anchor_worker(
        AnchorWorkerConfig::from_env(),
        orchestrator.clone(),
        ledger.clone() as Arc<dyn VoteLedger>,
    );

    let state = AppState {
        ledger,
        orchestrator,
        registry,
        server_salt: config.server_salt.clone(),
    };

    let app = build_router().with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("vote-anchor is ready to accept connections");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api", crate::api::router())
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "vote-anchor",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, (axum::http::StatusCode, String)> {
    match state.ledger.status_counts().await {
        Ok(_) => Ok(axum::Json(serde_json::json!({
            "status": "ready",
            "database": "connected",
            "chain": if state.registry.is_some() { "configured" } else { "simulated" },
        }))),
        Err(e) => Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            format!("Database unavailable: {}", e),
        )),
    }
}
