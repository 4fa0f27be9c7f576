//! Session fixtures and protocol helpers shared across the test suite.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use xfscene::backend::connection::egress::{EgressEvent, EgressQueue};
use xfscene::backend::server::config::ServerConfig;
use xfscene::backend::session::actor::{SessionActor, SessionCommand, SessionHandle};
use xfscene::backend::session::registry::SessionRegistry;
use xfscene::backend::session::state::{MutationOp, SessionState};
use xfscene::backend::Metrics;
use xfscene::shared::envelope::{
    CreateObjectPayload, DeleteObjectPayload, ErrorCode, UpdateNamePayload,
    UpdatePropertiesPayload, UpdateTransformPayload,
};
use xfscene::shared::scene::{ObjectKind, ObjectProperties, Transform};

/// A config rooted at a temp data dir, with protocol defaults otherwise.
pub fn test_config(data_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    }
}

/// A registry over a temp data dir.
pub fn test_registry(config: ServerConfig) -> SessionRegistry {
    SessionRegistry::new(Arc::new(config), Metrics::new())
}

/// Spawn a bare in-memory session actor (no durable log).
pub fn spawn_session(session_id: &str) -> SessionHandle {
    spawn_session_with_config(session_id, ServerConfig::default())
}

/// Spawn a bare in-memory session actor with explicit limits.
pub fn spawn_session_with_config(session_id: &str, config: ServerConfig) -> SessionHandle {
    SessionActor::spawn(
        SessionState::new(session_id),
        None,
        Metrics::new(),
        Arc::new(config),
    )
}

/// One simulated participant: a user id plus the egress queue its
/// connection handler would drain.
#[derive(Debug)]
pub struct TestClient {
    pub user_id: String,
    pub egress: Arc<EgressQueue>,
}

impl TestClient {
    /// Next frame from this client's egress queue, parsed.
    pub async fn next_event(&self) -> serde_json::Value {
        match timeout(Duration::from_secs(2), self.egress.next())
            .await
            .expect("timed out waiting for a frame")
        {
            EgressEvent::Frame(json) => serde_json::from_str(&json).expect("frame is not JSON"),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    /// Expect the actor to have kicked this client.
    pub async fn expect_kick(&self) -> ErrorCode {
        match timeout(Duration::from_secs(2), self.egress.next())
            .await
            .expect("timed out waiting for a kick")
        {
            EgressEvent::Kick(code) => code,
            other => panic!("expected a kick, got {other:?}"),
        }
    }

    /// True when nothing is queued for this client.
    pub fn is_idle(&self) -> bool {
        self.egress.is_empty()
    }
}

/// Join a user to a session actor, draining its FULL_STATE_SYNC.
pub async fn join(handle: &SessionHandle, user_id: &str) -> TestClient {
    let client = try_join(handle, user_id)
        .await
        .unwrap_or_else(|code| panic!("join of {user_id} rejected with {code}"));
    let sync = client.next_event().await;
    assert_eq!(sync["event_type"], "FULL_STATE_SYNC");
    client
}

/// Join without assuming success; the sync frame (on success) is left queued.
pub async fn try_join(handle: &SessionHandle, user_id: &str) -> Result<TestClient, ErrorCode> {
    try_join_with_capacity(handle, user_id, ServerConfig::default().egress_capacity).await
}

/// Join with an explicit egress capacity (for backpressure tests).
pub async fn try_join_with_capacity(
    handle: &SessionHandle,
    user_id: &str,
    egress_capacity: usize,
) -> Result<TestClient, ErrorCode> {
    let egress = Arc::new(EgressQueue::new(egress_capacity));
    let (reply_tx, reply_rx) = oneshot::channel();
    assert!(
        handle
            .send(SessionCommand::Join {
                user_id: user_id.to_string(),
                display_name: user_id.to_uppercase(),
                egress: egress.clone(),
                reply: reply_tx,
            })
            .await,
        "session actor is gone"
    );
    reply_rx.await.expect("actor dropped the join reply")?;
    Ok(TestClient {
        user_id: user_id.to_string(),
        egress,
    })
}

/// Send one mutation on behalf of `client`.
pub async fn mutate(
    handle: &SessionHandle,
    client: &TestClient,
    timestamp_ms: u64,
    op: MutationOp,
) {
    assert!(
        handle
            .send(SessionCommand::Mutate {
                user_id: client.user_id.clone(),
                timestamp_ms,
                received_at: Instant::now(),
                op,
            })
            .await
    );
}

// ── Mutation builders ─────────────────────────────────────────────────────────

pub fn create_cube(object_id: Uuid, name: &str) -> MutationOp {
    MutationOp::CreateObject(CreateObjectPayload {
        object_id,
        name: name.to_string(),
        kind: ObjectKind::Cube,
        asset_id: None,
        asset_library: None,
        transform: Transform::identity(),
        properties: ObjectProperties::Empty {},
    })
}

pub fn delete(object_id: Uuid) -> MutationOp {
    MutationOp::DeleteObject(DeleteObjectPayload { object_id })
}

pub fn move_to(object_id: Uuid, x: f64) -> MutationOp {
    MutationOp::UpdateTransform(UpdateTransformPayload {
        object_id,
        transform: Transform {
            position: [x, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        },
    })
}

pub fn rename(object_id: Uuid, name: &str) -> MutationOp {
    MutationOp::UpdateName(UpdateNamePayload {
        object_id,
        name: name.to_string(),
    })
}

pub fn set_sun_properties(object_id: Uuid) -> MutationOp {
    MutationOp::UpdateProperties(UpdatePropertiesPayload {
        object_id,
        properties: ObjectProperties::SunLight {
            color_rgb: [1.0, 0.9, 0.8],
            intensity: 3.0,
            angle_rad: 0.1,
        },
    })
}
