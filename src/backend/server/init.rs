/**
 * Server Initialization
 *
 * Builds the Axum application: runs recovery boot against the data
 * directory, primes the session registry with the recovered actors, and
 * assembles the router.
 *
 * # Routes
 *
 * - `GET /ws` - WebSocket upgrade for editor clients
 * - `GET /metrics` - JSON metrics snapshot
 */

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;

use crate::backend::connection::handler::ws_handler;
use crate::backend::error::BackendError;
use crate::backend::metrics::{metrics_handler, Metrics};
use crate::backend::server::config::ServerConfig;
use crate::backend::server::state::AppState;
use crate::backend::session::registry::SessionRegistry;
use crate::backend::storage::recovery::recover_sessions;

/// Create the Axum app and its shared state.
///
/// Recovery runs here, before the server accepts a single connection, so a
/// client can never observe a half-rehydrated session.
pub async fn create_app(config: ServerConfig) -> Result<(Router, AppState), BackendError> {
    let config = Arc::new(config);
    std::fs::create_dir_all(&config.data_dir)?;

    let metrics = Metrics::new();
    let registry = SessionRegistry::new(config.clone(), metrics.clone());

    let recovered = recover_sessions(&config.data_dir)?;
    let recovered_count = recovered.len();
    registry.prime(recovered);
    if recovered_count > 0 {
        tracing::info!(sessions = recovered_count, "recovery boot complete");
    }

    let state = AppState {
        registry,
        metrics,
        config,
    };

    let app = Router::new()
        .route("/ws", any(ws_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    Ok((app, state))
}
