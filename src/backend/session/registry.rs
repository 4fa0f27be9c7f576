/**
 * Session Registry
 *
 * The process-wide directory of live session actors: `session_id → handle`.
 * Supports concurrent lookups and exclusive inserts, enforces the global
 * session cap, and is the only cross-session shared structure in the
 * server.
 *
 * Session lifecycle: created on first join (or recovered at boot), persists
 * across all users disconnecting, and is torn down only at process
 * shutdown. The on-disk log remains until operator action.
 */

use std::sync::Arc;

use dashmap::DashMap;

use crate::backend::error::BackendError;
use crate::backend::metrics::Metrics;
use crate::backend::server::config::ServerConfig;
use crate::backend::session::actor::{SessionActor, SessionHandle};
use crate::backend::session::state::SessionState;
use crate::backend::storage::recovery::{self, RecoveredSession};
use crate::shared::envelope::ErrorCode;

/// Session ids double as data-directory file names, so they are restricted
/// to a filesystem-safe alphabet.
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

/// Cloneable handle to the process-wide session directory.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
    metrics: Metrics,
    config: Arc<ServerConfig>,
}

impl SessionRegistry {
    pub fn new(config: Arc<ServerConfig>, metrics: Metrics) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            metrics,
            config,
        }
    }

    /// Register sessions rebuilt by recovery boot. Recovered sessions do not
    /// count against the creation cap; they already existed.
    pub fn prime(&self, recovered: Vec<RecoveredSession>) {
        for session in recovered {
            let session_id = session.state.session_id().to_string();
            let handle = SessionActor::spawn(
                session.state,
                Some(session.store),
                self.metrics.clone(),
                self.config.clone(),
            );
            self.sessions.insert(session_id, handle);
            self.metrics.session_opened();
        }
    }

    /// Resolve the actor for `session_id`, spawning it if this is the first
    /// join of a new session.
    ///
    /// A new session starts from whatever is on disk for that name (nothing,
    /// normally). If its event log cannot be opened, the session runs
    /// without durability rather than refusing service.
    pub fn join_or_create(&self, session_id: &str) -> Result<SessionHandle, BackendError> {
        if let Some(handle) = self.sessions.get(session_id) {
            return Ok(handle.value().clone());
        }
        if self.sessions.len() >= self.config.max_sessions {
            return Err(BackendError::rejected(
                ErrorCode::GlobalSessionLimit,
                format!("server is at its {}-session cap", self.config.max_sessions),
            ));
        }

        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let (state, store) =
                    match recovery::load_session(&self.config.data_dir, session_id) {
                        Ok(recovered) => (recovered.state, Some(recovered.store)),
                        Err(e) => {
                            tracing::error!(
                                session_id = %session_id,
                                error = %e,
                                "failed to open event log; session runs without durability"
                            );
                            (SessionState::new(session_id), None)
                        }
                    };
                tracing::info!(session_id = %session_id, "session created");
                self.metrics.session_opened();
                SessionActor::spawn(state, store, self.metrics.clone(), self.config.clone())
            })
            .value()
            .clone();
        Ok(handle)
    }

    /// Look up a live session actor.
    pub fn lookup(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Shut every actor down and wait for final snapshots.
    pub async fn shutdown_all(&self) {
        let handles: Vec<(String, SessionHandle)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (session_id, handle) in handles {
            handle.shutdown().await;
            self.metrics.session_closed();
            tracing::info!(session_id = %session_id, "session shut down");
        }
        self.sessions.clear();
    }
}
