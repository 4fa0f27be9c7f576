/**
 * Recovery Boot
 *
 * Runs once at startup: discovers every persisted session under the data
 * directory, replays its snapshot + log through the same state transitions
 * the live server uses, and hands the rebuilt sessions to the registry.
 *
 * Users are presence, not scene content, so every recovered session starts
 * with an empty user map and no selections.
 */

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::backend::error::BackendError;
use crate::backend::session::state::SessionState;
use crate::backend::storage::event_log::EventLogStore;

/// A session rebuilt from disk, ready to be wrapped in an actor.
pub struct RecoveredSession {
    pub state: SessionState,
    pub store: EventLogStore,
}

/// Load one session's persisted state (empty state if nothing is on disk)
/// and open its append handle.
pub fn load_session(data_dir: &Path, session_id: &str) -> Result<RecoveredSession, BackendError> {
    let (snapshot, records) = EventLogStore::replay(data_dir, session_id)?;

    let mut state = match snapshot {
        Some(snapshot) => SessionState::from_snapshot(snapshot),
        None => SessionState::new(session_id),
    };

    for record in records {
        // The log holds accepted mutations only, so each record re-applies
        // cleanly. Anything else means the log predates a manual edit or a
        // bug; skip it rather than refuse to boot.
        match state.apply_mutation(&record.user_id, record.timestamp_ms, &record.op) {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(
                    session_id = %session_id,
                    seq = record.seq,
                    kind = record.op.kind(),
                    "log record replayed to a no-op; skipping"
                );
            }
            Err(code) => {
                tracing::warn!(
                    session_id = %session_id,
                    seq = record.seq,
                    kind = record.op.kind(),
                    code = %code,
                    "log record rejected on replay; skipping"
                );
            }
        }
    }

    let store = EventLogStore::open(data_dir, session_id)?;
    Ok(RecoveredSession { state, store })
}

/// Enumerate persisted sessions and rebuild each one.
///
/// A session that fails to load is logged and skipped; one bad log must not
/// keep the server from booting the rest.
pub fn recover_sessions(data_dir: &Path) -> Result<Vec<RecoveredSession>, BackendError> {
    let mut session_ids = BTreeSet::new();

    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(session_id) = name.strip_suffix(".log") {
            session_ids.insert(session_id.to_string());
        } else if let Some(session_id) = name.strip_suffix(".snapshot.json") {
            session_ids.insert(session_id.to_string());
        }
    }

    let mut recovered = Vec::new();
    for session_id in session_ids {
        match load_session(data_dir, &session_id) {
            Ok(session) => {
                tracing::info!(
                    session_id = %session_id,
                    objects = session.state.objects().len(),
                    seq = session.state.last_seq(),
                    "session recovered from disk"
                );
                recovered.push(session);
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "failed to recover session; skipping"
                );
            }
        }
    }
    Ok(recovered)
}
