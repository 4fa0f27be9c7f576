/**
 * Wire Envelope & Typed Events
 *
 * Every WebSocket frame in either direction is exactly one JSON envelope:
 *
 * ```json
 * { "event_type": "...", "timestamp": 1700000000000,
 *   "source_user_id": "u1", "payload": { ... } }
 * ```
 *
 * Client frames are decoded in two steps: the envelope is parsed first, then
 * `payload` is decoded against the schema selected by `event_type`. This
 * keeps every decoding failure reportable as a single `MALFORMED` error
 * frame without tearing down the connection.
 */

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::SharedError;
use crate::shared::scene::{ObjectKind, ObjectProperties, SceneObject, Transform};
use crate::shared::user::User;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The untyped envelope, as read off the wire.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RawEnvelope {
    pub event_type: String,
    pub timestamp: u64,
    pub source_user_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A fully decoded client frame.
#[derive(Clone, Debug)]
pub struct ClientFrame {
    /// Client-set wall clock, relayed unchanged into LWW decisions
    pub timestamp_ms: u64,
    /// The identity the client claims; checked against the JOIN'd identity
    pub source_user_id: String,
    pub event: ClientEvent,
}

// ── Client → Server payloads ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JoinSessionPayload {
    pub session_id: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateObjectPayload {
    pub object_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub asset_library: Option<String>,
    pub transform: Transform,
    #[serde(default)]
    pub properties: ObjectProperties,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeleteObjectPayload {
    pub object_id: Uuid,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UpdateTransformPayload {
    pub object_id: Uuid,
    pub transform: Transform,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UpdatePropertiesPayload {
    pub object_id: Uuid,
    pub properties: ObjectProperties,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UpdateNamePayload {
    pub object_id: Uuid,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SelectObjectPayload {
    /// `None` means deselect
    #[serde(default)]
    pub object_id: Option<Uuid>,
}

/// Typed client events.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    JoinSession(JoinSessionPayload),
    LeaveSession,
    CreateObject(CreateObjectPayload),
    DeleteObject(DeleteObjectPayload),
    UpdateTransform(UpdateTransformPayload),
    UpdateProperties(UpdatePropertiesPayload),
    UpdateName(UpdateNamePayload),
    SelectObject(SelectObjectPayload),
}

impl ClientEvent {
    /// The wire name of this event, for logging and metrics.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::JoinSession(_) => "JOIN_SESSION",
            ClientEvent::LeaveSession => "LEAVE_SESSION",
            ClientEvent::CreateObject(_) => "CREATE_OBJECT",
            ClientEvent::DeleteObject(_) => "DELETE_OBJECT",
            ClientEvent::UpdateTransform(_) => "UPDATE_TRANSFORM",
            ClientEvent::UpdateProperties(_) => "UPDATE_PROPERTIES",
            ClientEvent::UpdateName(_) => "UPDATE_NAME",
            ClientEvent::SelectObject(_) => "SELECT_OBJECT",
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

fn payload<T: serde::de::DeserializeOwned>(
    event_type: &str,
    value: serde_json::Value,
) -> Result<T, SharedError> {
    serde_json::from_value(value)
        .map_err(|e| SharedError::malformed(format!("bad {event_type} payload: {e}")))
}

/// Decode a raw JSON string into a typed [`ClientFrame`].
pub fn parse_client_frame(raw: &str) -> Result<ClientFrame, SharedError> {
    let envelope: RawEnvelope = serde_json::from_str(raw)
        .map_err(|e| SharedError::malformed(format!("bad envelope: {e}")))?;

    let event = match envelope.event_type.as_str() {
        "JOIN_SESSION" => ClientEvent::JoinSession(payload("JOIN_SESSION", envelope.payload)?),
        "LEAVE_SESSION" => ClientEvent::LeaveSession,
        "CREATE_OBJECT" => ClientEvent::CreateObject(payload("CREATE_OBJECT", envelope.payload)?),
        "DELETE_OBJECT" => ClientEvent::DeleteObject(payload("DELETE_OBJECT", envelope.payload)?),
        "UPDATE_TRANSFORM" => {
            ClientEvent::UpdateTransform(payload("UPDATE_TRANSFORM", envelope.payload)?)
        }
        "UPDATE_PROPERTIES" => {
            ClientEvent::UpdateProperties(payload("UPDATE_PROPERTIES", envelope.payload)?)
        }
        "UPDATE_NAME" => ClientEvent::UpdateName(payload("UPDATE_NAME", envelope.payload)?),
        "SELECT_OBJECT" => ClientEvent::SelectObject(payload("SELECT_OBJECT", envelope.payload)?),
        other => {
            return Err(SharedError::malformed(format!(
                "unknown event_type `{other}`"
            )))
        }
    };

    Ok(ClientFrame {
        timestamp_ms: envelope.timestamp,
        source_user_id: envelope.source_user_id,
        event,
    })
}

// ── Server → Client payloads ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FullStateSyncPayload {
    pub session_id: String,
    pub objects: HashMap<Uuid, SceneObject>,
    pub users: HashMap<String, User>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectCreatedPayload {
    pub object: SceneObject,
    pub created_by: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectDeletedPayload {
    pub object_id: Uuid,
    pub deleted_by: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TransformUpdatedPayload {
    pub object_id: Uuid,
    pub transform: Transform,
    pub updated_by: String,
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PropertiesUpdatedPayload {
    pub object_id: Uuid,
    pub properties: ObjectProperties,
    pub updated_by: String,
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NameUpdatedPayload {
    pub object_id: Uuid,
    pub name: String,
    pub updated_by: String,
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserJoinedPayload {
    pub user_id: String,
    pub display_name: String,
    pub color: [u8; 3],
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserLeftPayload {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserSelectedPayload {
    pub user_id: String,
    pub object_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

// ── Server event enum ─────────────────────────────────────────────────────────

/// Typed server events, tagged with the wire `event_type` names.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "event_type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    FullStateSync(FullStateSyncPayload),
    ObjectCreated(ObjectCreatedPayload),
    ObjectDeleted(ObjectDeletedPayload),
    TransformUpdated(TransformUpdatedPayload),
    PropertiesUpdated(PropertiesUpdatedPayload),
    NameUpdated(NameUpdatedPayload),
    UserJoined(UserJoinedPayload),
    UserLeft(UserLeftPayload),
    UserSelected(UserSelectedPayload),
    Error(ErrorPayload),
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    timestamp: u64,
    source_user_id: &'a str,
    #[serde(flatten)]
    event: &'a ServerEvent,
}

impl ServerEvent {
    /// Shorthand for an error event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    /// Serialize this event into a complete wire frame.
    ///
    /// `source_user_id` is the user the event originated from, or `"server"`
    /// for server-originated frames (sync, errors).
    pub fn to_frame(&self, timestamp_ms: u64, source_user_id: &str) -> String {
        serde_json::to_string(&OutboundEnvelope {
            timestamp: timestamp_ms,
            source_user_id,
            event: self,
        })
        .expect("server event serialization failed")
    }
}

// ── Error codes ───────────────────────────────────────────────────────────────

/// Wire-visible error codes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotJoined,
    IdentityMismatch,
    DuplicateUser,
    DuplicateObject,
    UnknownObject,
    RateLimited,
    Overloaded,
    GlobalSessionLimit,
    SessionFull,
    Malformed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotJoined => "NOT_JOINED",
            ErrorCode::IdentityMismatch => "IDENTITY_MISMATCH",
            ErrorCode::DuplicateUser => "DUPLICATE_USER",
            ErrorCode::DuplicateObject => "DUPLICATE_OBJECT",
            ErrorCode::UnknownObject => "UNKNOWN_OBJECT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Overloaded => "OVERLOADED",
            ErrorCode::GlobalSessionLimit => "GLOBAL_SESSION_LIMIT",
            ErrorCode::SessionFull => "SESSION_FULL",
            ErrorCode::Malformed => "MALFORMED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
