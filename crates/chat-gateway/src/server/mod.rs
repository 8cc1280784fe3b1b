//! Gateway server setup
//!
//! Provides the WebSocket server configuration, routes and background tasks.

mod handler;
mod state;

pub use handler::gateway_handler;
pub use state::GatewayState;

use crate::handlers::teardown;
use crate::protocol::{CloseCode, GatewayMessage};
use axum::{extract::State, routing::get, Json, Router};
use chat_common::{AppConfig, AppError, JwtService};
use chat_store::{MemoryStore, Seed};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// How often expired retained sessions are released
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// How long shutdown waits for sessions to close
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/", get(gateway_handler))
        .route("/gateway", get(gateway_handler))
        .route("/api/v6/gateway", get(gateway_url))
        .route("/api/v7/gateway", get(gateway_url))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Where clients should connect
async fn gateway_url(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "url": state.gateway_config().public_url }))
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize all dependencies and create `GatewayState`
pub async fn create_gateway_state(config: AppConfig) -> Result<GatewayState, AppError> {
    let store = MemoryStore::new();
    if let Some(path) = &config.store.seed_path {
        Seed::load(path).await?.apply(&store);
    }
    tracing::info!(
        users = store.user_count(),
        guilds = store.guild_count(),
        "In-memory store ready"
    );

    let jwt_service = JwtService::from_config(&config.jwt);

    Ok(GatewayState::new(config, Arc::new(store), Arc::new(jwt_service)))
}

/// Periodically release retained sessions past their resume window
pub fn spawn_sweeper(state: GatewayState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            teardown::sweep_expired(&state);
        }
    })
}

/// Ask every live session to reconnect elsewhere, then close it resumably
pub fn request_reconnect(state: &GatewayState) -> usize {
    let sessions = state.registry().live_sessions();
    for session in &sessions {
        if let Err(e) = session.send_control(&GatewayMessage::reconnect()) {
            tracing::debug!(session_id = %session.id(), error = %e, "Failed to send Reconnect");
        }
        session.schedule_close(CloseCode::UnknownError);
    }
    sessions.len()
}

/// Serve the gateway on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    let sweeper = spawn_sweeper(state.clone());
    let app = create_app(state.clone());

    let signal_state = state.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let count = request_reconnect(&signal_state);
            tracing::info!(sessions = count, "Shutting down, sessions asked to reconnect");
        })
        .await;

    // Upgraded sockets are not tracked by the server; give them a moment
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while !state.registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    sweeper.abort();

    result.map_err(AppError::from)
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr = config.server.address();
    let state = create_gateway_state(config).await?;

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Gateway listening on ws://{}/gateway", addr);

    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
}
