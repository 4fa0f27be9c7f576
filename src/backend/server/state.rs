/**
 * Application State
 *
 * The `AppState` struct is the central state container handed to Axum: the
 * session registry, the metrics handle, and the configuration. All three
 * are cheap to clone (`Arc` inside), and the `FromRef` implementations let
 * handlers extract just the part they need.
 *
 * There are no process-wide mutable singletons: everything a task touches
 * arrives through this struct at spawn time.
 */

use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::metrics::Metrics;
use crate::backend::server::config::ServerConfig;
use crate::backend::session::registry::SessionRegistry;

/// Shared state for the Axum application.
#[derive(Clone)]
pub struct AppState {
    /// Directory of live session actors
    pub registry: SessionRegistry,
    /// Process-wide counters and the latency window
    pub metrics: Metrics,
    /// Effective configuration
    pub config: Arc<ServerConfig>,
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.registry.clone()
    }
}

impl FromRef<AppState> for Metrics {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.metrics.clone()
    }
}

impl FromRef<AppState> for Arc<ServerConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.clone()
    }
}
