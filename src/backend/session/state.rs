/**
 * Canonical Session State
 *
 * This module holds the pure in-memory state of one session: the object map,
 * the user map, and the monotonic event sequence number. It performs no I/O
 * and holds no concurrency primitives; the owning session actor is the only
 * writer.
 *
 * # Last-Write-Wins
 *
 * Every update command carries the client's `timestamp_ms`, relayed
 * unchanged. An update applies iff its timestamp is strictly greater than
 * the object's `last_updated_at`; an equal or smaller timestamp is discarded
 * as stale. Ties discard the later arrival, which makes the outcome
 * deterministic and independent of arrival order.
 *
 * # Replay
 *
 * The event log records accepted mutations only, so crash recovery replays
 * them through the exact same transitions and arrives at the same state.
 */

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::envelope::{
    CreateObjectPayload, DeleteObjectPayload, ErrorCode, FullStateSyncPayload,
    NameUpdatedPayload, ObjectCreatedPayload, ObjectDeletedPayload, PropertiesUpdatedPayload,
    ServerEvent, TransformUpdatedPayload, UpdateNamePayload, UpdatePropertiesPayload,
    UpdateTransformPayload, UserJoinedPayload, UserSelectedPayload,
};
use crate::shared::scene::SceneObject;
use crate::shared::user::{palette_color, User};

// ── Mutations ─────────────────────────────────────────────────────────────────

/// A mutating command, as logged and replayed.
///
/// The `kind`/`payload` tagging matches the wire event names, so log records
/// read the same as the frames that produced them.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationOp {
    CreateObject(CreateObjectPayload),
    DeleteObject(DeleteObjectPayload),
    UpdateTransform(UpdateTransformPayload),
    UpdateProperties(UpdatePropertiesPayload),
    UpdateName(UpdateNamePayload),
}

impl MutationOp {
    /// The object this mutation targets.
    pub fn object_id(&self) -> Uuid {
        match self {
            MutationOp::CreateObject(p) => p.object_id,
            MutationOp::DeleteObject(p) => p.object_id,
            MutationOp::UpdateTransform(p) => p.object_id,
            MutationOp::UpdateProperties(p) => p.object_id,
            MutationOp::UpdateName(p) => p.object_id,
        }
    }

    /// The wire name of this mutation, for logging and log records.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationOp::CreateObject(_) => "CREATE_OBJECT",
            MutationOp::DeleteObject(_) => "DELETE_OBJECT",
            MutationOp::UpdateTransform(_) => "UPDATE_TRANSFORM",
            MutationOp::UpdateProperties(_) => "UPDATE_PROPERTIES",
            MutationOp::UpdateName(_) => "UPDATE_NAME",
        }
    }
}

// ── Snapshot form ─────────────────────────────────────────────────────────────

/// Serialized canonical state, as written to the snapshot sidecar.
///
/// Users are presence, not scene content: they are never persisted, so the
/// user map is always empty after recovery.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionSnapshot {
    /// Sequence number of the last mutation folded into `objects`
    pub seq: u64,
    pub session_id: String,
    pub objects: HashMap<Uuid, SceneObject>,
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Pure canonical state for one session.
#[derive(Clone, Debug)]
pub struct SessionState {
    session_id: String,
    objects: HashMap<Uuid, SceneObject>,
    users: HashMap<String, User>,
    /// Sequence number of the last accepted mutation (0 = none)
    last_seq: u64,
    /// Count of users who have ever joined; drives palette assignment and
    /// never decreases within a process lifetime
    seats_assigned: u64,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            objects: HashMap::new(),
            users: HashMap::new(),
            last_seq: 0,
            seats_assigned: 0,
        }
    }

    /// Rebuild state from a snapshot. The user map starts empty.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            objects: snapshot.objects,
            users: HashMap::new(),
            last_seq: snapshot.seq,
            seats_assigned: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn objects(&self) -> &HashMap<Uuid, SceneObject> {
        &self.objects
    }

    pub fn users(&self) -> &HashMap<String, User> {
        &self.users
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Serialize the scene content for a snapshot write.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            seq: self.last_seq,
            session_id: self.session_id.clone(),
            objects: self.objects.clone(),
        }
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    /// Apply one mutating command.
    ///
    /// - `Ok(Some(event))` - applied; `last_seq` was bumped and the event
    ///   must be logged and broadcast.
    /// - `Ok(None)` - silent success: an LWW-stale update or a delete of a
    ///   missing object. Nothing is logged, nothing is broadcast.
    /// - `Err(code)` - rejected; reported to the originator only.
    pub fn apply_mutation(
        &mut self,
        user_id: &str,
        timestamp_ms: u64,
        op: &MutationOp,
    ) -> Result<Option<ServerEvent>, ErrorCode> {
        match op {
            MutationOp::CreateObject(payload) => self.create_object(user_id, timestamp_ms, payload),
            MutationOp::DeleteObject(payload) => Ok(self.delete_object(user_id, payload)),
            MutationOp::UpdateTransform(payload) => {
                self.update_transform(user_id, timestamp_ms, payload)
            }
            MutationOp::UpdateProperties(payload) => {
                self.update_properties(user_id, timestamp_ms, payload)
            }
            MutationOp::UpdateName(payload) => self.update_name(user_id, timestamp_ms, payload),
        }
    }

    fn create_object(
        &mut self,
        user_id: &str,
        timestamp_ms: u64,
        payload: &CreateObjectPayload,
    ) -> Result<Option<ServerEvent>, ErrorCode> {
        // Object ids are never reused after deletion, and a live duplicate is
        // a client bug either way.
        if self.objects.contains_key(&payload.object_id) {
            return Err(ErrorCode::DuplicateObject);
        }

        let object = SceneObject {
            object_id: payload.object_id,
            name: payload.name.clone(),
            kind: payload.kind,
            asset_id: payload.asset_id.clone(),
            asset_library: payload.asset_library.clone(),
            transform: payload.transform.clone(),
            properties: payload.properties.clone(),
            created_by: user_id.to_string(),
            created_at: timestamp_ms,
            last_updated_by: user_id.to_string(),
            last_updated_at: timestamp_ms,
        };
        self.objects.insert(object.object_id, object.clone());
        self.last_seq += 1;

        Ok(Some(ServerEvent::ObjectCreated(ObjectCreatedPayload {
            object,
            created_by: user_id.to_string(),
        })))
    }

    fn delete_object(&mut self, user_id: &str, payload: &DeleteObjectPayload) -> Option<ServerEvent> {
        // Deleting a missing object is success with no effect.
        self.objects.remove(&payload.object_id)?;
        self.last_seq += 1;

        Some(ServerEvent::ObjectDeleted(ObjectDeletedPayload {
            object_id: payload.object_id,
            deleted_by: user_id.to_string(),
        }))
    }

    /// LWW gate shared by all three update kinds: returns the object iff the
    /// update should apply.
    fn lww_target(
        objects: &mut HashMap<Uuid, SceneObject>,
        object_id: Uuid,
        timestamp_ms: u64,
    ) -> Result<Option<&mut SceneObject>, ErrorCode> {
        match objects.get_mut(&object_id) {
            None => Err(ErrorCode::UnknownObject),
            Some(object) if timestamp_ms <= object.last_updated_at => Ok(None),
            Some(object) => Ok(Some(object)),
        }
    }

    fn update_transform(
        &mut self,
        user_id: &str,
        timestamp_ms: u64,
        payload: &UpdateTransformPayload,
    ) -> Result<Option<ServerEvent>, ErrorCode> {
        let Some(object) = Self::lww_target(&mut self.objects, payload.object_id, timestamp_ms)?
        else {
            return Ok(None);
        };
        object.transform = payload.transform.clone();
        object.last_updated_by = user_id.to_string();
        object.last_updated_at = timestamp_ms;
        self.last_seq += 1;

        Ok(Some(ServerEvent::TransformUpdated(TransformUpdatedPayload {
            object_id: payload.object_id,
            transform: payload.transform.clone(),
            updated_by: user_id.to_string(),
            timestamp: timestamp_ms,
        })))
    }

    fn update_properties(
        &mut self,
        user_id: &str,
        timestamp_ms: u64,
        payload: &UpdatePropertiesPayload,
    ) -> Result<Option<ServerEvent>, ErrorCode> {
        // Shape/range validation needs the object's kind, so it happens here
        // rather than at the connection handler.
        if let Some(object) = self.objects.get(&payload.object_id) {
            if payload.properties.validate_for(object.kind).is_err() {
                return Err(ErrorCode::Malformed);
            }
        }
        let Some(object) = Self::lww_target(&mut self.objects, payload.object_id, timestamp_ms)?
        else {
            return Ok(None);
        };
        object.properties = payload.properties.clone();
        object.last_updated_by = user_id.to_string();
        object.last_updated_at = timestamp_ms;
        self.last_seq += 1;

        Ok(Some(ServerEvent::PropertiesUpdated(
            PropertiesUpdatedPayload {
                object_id: payload.object_id,
                properties: payload.properties.clone(),
                updated_by: user_id.to_string(),
                timestamp: timestamp_ms,
            },
        )))
    }

    fn update_name(
        &mut self,
        user_id: &str,
        timestamp_ms: u64,
        payload: &UpdateNamePayload,
    ) -> Result<Option<ServerEvent>, ErrorCode> {
        let Some(object) = Self::lww_target(&mut self.objects, payload.object_id, timestamp_ms)?
        else {
            return Ok(None);
        };
        object.name = payload.name.clone();
        object.last_updated_by = user_id.to_string();
        object.last_updated_at = timestamp_ms;
        self.last_seq += 1;

        Ok(Some(ServerEvent::NameUpdated(NameUpdatedPayload {
            object_id: payload.object_id,
            name: payload.name.clone(),
            updated_by: user_id.to_string(),
            timestamp: timestamp_ms,
        })))
    }

    // ── Presence ──────────────────────────────────────────────────────────

    /// Add a user to the session.
    ///
    /// Rejects a `user_id` that is already connected (`DUPLICATE_USER`) and a
    /// session at its user cap (`SESSION_FULL`). The color comes from the
    /// palette by seat index, which only ever grows.
    pub fn join(
        &mut self,
        user_id: &str,
        display_name: &str,
        now_ms: u64,
        max_users: usize,
    ) -> Result<UserJoinedPayload, ErrorCode> {
        if self.users.contains_key(user_id) {
            return Err(ErrorCode::DuplicateUser);
        }
        if self.users.len() >= max_users {
            return Err(ErrorCode::SessionFull);
        }

        let color = palette_color(self.seats_assigned);
        self.seats_assigned += 1;
        self.users.insert(
            user_id.to_string(),
            User {
                display_name: display_name.to_string(),
                color_rgb: color,
                selected_object: None,
                connected_at: now_ms,
            },
        );

        Ok(UserJoinedPayload {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            color,
        })
    }

    /// Remove a user. Idempotent; returns the removed record if any.
    pub fn leave(&mut self, user_id: &str) -> Option<User> {
        self.users.remove(user_id)
    }

    /// Update a user's selection. Returns the broadcast, or `None` when the
    /// user is not in this session.
    pub fn select(&mut self, user_id: &str, object_id: Option<Uuid>) -> Option<ServerEvent> {
        let user = self.users.get_mut(user_id)?;
        user.selected_object = object_id;
        Some(ServerEvent::UserSelected(UserSelectedPayload {
            user_id: user_id.to_string(),
            object_id,
        }))
    }

    /// The full snapshot sent to a joining connection.
    pub fn full_state_sync(&self) -> ServerEvent {
        ServerEvent::FullStateSync(FullStateSyncPayload {
            session_id: self.session_id.clone(),
            objects: self.objects.clone(),
            users: self.users.clone(),
        })
    }
}
