/**
 * Connection Handler
 *
 * One task per WebSocket connection. The handler authenticates membership
 * at JOIN time (resolves `user_id` + `session_id`), parses incoming frames
 * into the envelope schema, enforces the per-connection rate limit, routes
 * typed commands to the owning session actor, and drains the connection's
 * egress queue into the socket.
 *
 * # Lifecycle
 *
 * On socket close, read/write error, or a caught panic, the handler issues
 * a synthetic LEAVE to the session actor so `USER_LEFT` is broadcast and
 * presence state is cleaned up. The session itself is never destroyed by a
 * disconnect.
 *
 * # Idle handling
 *
 * A connection with no traffic for 120 s is pinged; no pong within 30 s
 * closes it.
 */

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant as IdleInstant};
use uuid::Uuid;

use crate::backend::connection::egress::{EgressEvent, EgressQueue};
use crate::backend::connection::rate_limit::TokenBucket;
use crate::backend::now_ms;
use crate::backend::server::state::AppState;
use crate::backend::session::actor::{SessionCommand, SessionHandle};
use crate::backend::session::registry::is_valid_session_id;
use crate::backend::session::state::MutationOp;
use crate::shared::envelope::{
    parse_client_frame, ClientEvent, ClientFrame, ErrorCode, JoinSessionPayload, ServerEvent,
};
use crate::shared::scene::validate_asset_fields;

/// `GET /ws` upgrade entry-point.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Membership resolved by a successful JOIN on this connection.
struct Joined {
    session_id: String,
    user_id: String,
    handle: SessionHandle,
}

struct Connection {
    connection_id: Uuid,
    state: AppState,
    egress: Arc<EgressQueue>,
    joined: Option<Joined>,
    bucket: TokenBucket,
    last_activity: IdleInstant,
    awaiting_pong_since: Option<IdleInstant>,
    /// Informational per-object transform counts; clients self-throttle to
    /// 30 Hz and the server only observes
    transform_counts: HashMap<Uuid, u64>,
}

impl Connection {
    fn touch(&mut self) {
        self.last_activity = IdleInstant::now();
        self.awaiting_pong_since = None;
    }
}

enum Flow {
    Continue,
    Close,
}

/// Per-connection event loop, with panic isolation and leave-on-exit.
pub async fn handle_connection(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    state.metrics.connection_opened();
    tracing::info!(connection_id = %connection_id, "connection opened");

    let mut conn = Connection {
        connection_id,
        egress: Arc::new(EgressQueue::new(state.config.egress_capacity)),
        bucket: TokenBucket::new(state.config.rate_burst, state.config.messages_per_sec),
        state,
        joined: None,
        last_activity: IdleInstant::now(),
        awaiting_pong_since: None,
        transform_counts: HashMap::new(),
    };

    // Panics must not leak past one connection; the leave path below still
    // runs so presence stays consistent.
    if AssertUnwindSafe(drive_connection(&mut socket, &mut conn))
        .catch_unwind()
        .await
        .is_err()
    {
        tracing::error!(
            connection_id = %connection_id,
            "connection handler panicked; closing connection"
        );
    }

    if let Some(joined) = conn.joined.take() {
        joined
            .handle
            .send(SessionCommand::Leave {
                user_id: joined.user_id.clone(),
            })
            .await;
        tracing::info!(
            connection_id = %connection_id,
            session_id = %joined.session_id,
            user_id = %joined.user_id,
            "connection closed; issued synthetic leave"
        );
    } else {
        tracing::info!(connection_id = %connection_id, "connection closed (no active session)");
    }

    if !conn.transform_counts.is_empty() {
        tracing::debug!(
            connection_id = %connection_id,
            objects = conn.transform_counts.len(),
            updates = conn.transform_counts.values().sum::<u64>(),
            "transform update counts at close"
        );
    }
    conn.state.metrics.connection_closed();
}

async fn drive_connection(socket: &mut WebSocket, conn: &mut Connection) {
    let egress = conn.egress.clone();
    loop {
        let idle_deadline = match conn.awaiting_pong_since {
            Some(since) => since + conn.state.config.pong_grace,
            None => conn.last_activity + conn.state.config.idle_ping,
        };

        tokio::select! {
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        conn.touch();
                        let received_at = Instant::now();
                        if let Flow::Close =
                            handle_text(socket, conn, text.to_string(), received_at).await
                        {
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                        // axum answers pings on its own; both directions count
                        // as traffic.
                        conn.touch();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        conn.touch();
                        send_error(
                            socket,
                            conn,
                            ErrorCode::Malformed,
                            "frames must be textual JSON envelopes",
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(e)) => {
                        tracing::warn!(
                            connection_id = %conn.connection_id,
                            error = %e,
                            "socket read error"
                        );
                        return;
                    }
                }
            }
            event = egress.next() => {
                match event {
                    EgressEvent::Frame(json) => {
                        conn.state.metrics.message_out();
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            return;
                        }
                    }
                    EgressEvent::Kick(code) => {
                        send_error(socket, conn, code, "connection dropped by session").await;
                        return;
                    }
                    EgressEvent::Closed => return,
                }
            }
            _ = sleep_until(idle_deadline) => {
                if conn.awaiting_pong_since.is_some() {
                    tracing::info!(
                        connection_id = %conn.connection_id,
                        "no pong within grace period; closing idle connection"
                    );
                    return;
                }
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
                conn.awaiting_pong_since = Some(IdleInstant::now());
            }
        }
    }
}

async fn handle_text(
    socket: &mut WebSocket,
    conn: &mut Connection,
    text: String,
    received_at: Instant,
) -> Flow {
    conn.state.metrics.message_in();

    if !conn.bucket.try_acquire() {
        tracing::warn!(
            connection_id = %conn.connection_id,
            "message rate limit exceeded; closing connection"
        );
        send_error(socket, conn, ErrorCode::RateLimited, "message rate limit exceeded").await;
        return Flow::Close;
    }

    match parse_client_frame(&text) {
        Ok(frame) => dispatch(socket, conn, frame, received_at).await,
        Err(e) => {
            tracing::warn!(
                connection_id = %conn.connection_id,
                error = %e,
                "failed to parse client frame"
            );
            send_error(socket, conn, ErrorCode::Malformed, e.to_string()).await;
            Flow::Continue
        }
    }
}

async fn dispatch(
    socket: &mut WebSocket,
    conn: &mut Connection,
    frame: ClientFrame,
    received_at: Instant,
) -> Flow {
    match frame.event {
        ClientEvent::JoinSession(payload) => {
            handle_join(socket, conn, frame.source_user_id, payload).await
        }
        event => {
            handle_session_event(
                socket,
                conn,
                frame.source_user_id,
                frame.timestamp_ms,
                event,
                received_at,
            )
            .await
        }
    }
}

/// Route every post-JOIN event to the owning session actor.
async fn handle_session_event(
    socket: &mut WebSocket,
    conn: &mut Connection,
    source_user_id: String,
    timestamp_ms: u64,
    event: ClientEvent,
    received_at: Instant,
) -> Flow {
    let Some(joined) = conn.joined.as_ref() else {
        send_error(
            socket,
            conn,
            ErrorCode::NotJoined,
            format!("{} before JOIN_SESSION", event.event_type()),
        )
        .await;
        return Flow::Continue;
    };
    if source_user_id != joined.user_id {
        send_error(
            socket,
            conn,
            ErrorCode::IdentityMismatch,
            "source_user_id does not match the joined identity",
        )
        .await;
        return Flow::Continue;
    }
    let handle = joined.handle.clone();
    let user_id = joined.user_id.clone();

    let op = match event {
        ClientEvent::JoinSession(_) => unreachable!("JOIN_SESSION is dispatched separately"),
        ClientEvent::LeaveSession => {
            conn.joined = None;
            handle.send(SessionCommand::Leave { user_id }).await;
            return Flow::Continue;
        }
        ClientEvent::SelectObject(payload) => {
            let sent = handle
                .send(SessionCommand::Select {
                    user_id,
                    object_id: payload.object_id,
                    received_at,
                })
                .await;
            return if sent { Flow::Continue } else { Flow::Close };
        }
        ClientEvent::CreateObject(payload) => {
            // Shape checks that need no session state happen here, before the
            // command takes a mailbox slot.
            if let Err(e) =
                validate_asset_fields(payload.kind, &payload.asset_id, &payload.asset_library)
                    .and_then(|_| payload.properties.validate_for(payload.kind))
            {
                send_error(socket, conn, ErrorCode::Malformed, e.to_string()).await;
                return Flow::Continue;
            }
            MutationOp::CreateObject(payload)
        }
        ClientEvent::DeleteObject(payload) => MutationOp::DeleteObject(payload),
        ClientEvent::UpdateTransform(payload) => {
            conn.state.metrics.transform_update();
            *conn.transform_counts.entry(payload.object_id).or_default() += 1;
            MutationOp::UpdateTransform(payload)
        }
        ClientEvent::UpdateProperties(payload) => MutationOp::UpdateProperties(payload),
        ClientEvent::UpdateName(payload) => MutationOp::UpdateName(payload),
    };

    let sent = handle
        .send(SessionCommand::Mutate {
            user_id,
            timestamp_ms,
            received_at,
            op,
        })
        .await;
    if sent {
        Flow::Continue
    } else {
        // The actor is gone, which only happens at server shutdown.
        Flow::Close
    }
}

async fn handle_join(
    socket: &mut WebSocket,
    conn: &mut Connection,
    source_user_id: String,
    payload: JoinSessionPayload,
) -> Flow {
    if conn.joined.is_some() {
        send_error(
            socket,
            conn,
            ErrorCode::Malformed,
            "connection has already joined a session",
        )
        .await;
        return Flow::Continue;
    }
    if source_user_id.is_empty() {
        send_error(socket, conn, ErrorCode::Malformed, "source_user_id must not be empty").await;
        return Flow::Continue;
    }
    if !is_valid_session_id(&payload.session_id) {
        send_error(
            socket,
            conn,
            ErrorCode::Malformed,
            "session_id must be 1-128 chars of [A-Za-z0-9._-]",
        )
        .await;
        return Flow::Continue;
    }

    let handle = match conn.state.registry.join_or_create(&payload.session_id) {
        Ok(handle) => handle,
        Err(e) => {
            let code = e.error_code().unwrap_or(ErrorCode::Malformed);
            send_error(socket, conn, code, e.to_string()).await;
            return Flow::Continue;
        }
    };

    // Forward JOIN to the actor; a blocked mailbox gets one retry after the
    // timeout, then the join fails.
    let mut outcome = None;
    for attempt in 0..2 {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = handle
            .send(SessionCommand::Join {
                user_id: source_user_id.clone(),
                display_name: payload.display_name.clone(),
                egress: conn.egress.clone(),
                reply: reply_tx,
            })
            .await;
        if !sent {
            break;
        }
        match tokio::time::timeout(conn.state.config.join_timeout, reply_rx).await {
            Ok(Ok(result)) => {
                outcome = Some(result);
                break;
            }
            Ok(Err(_)) => break,
            Err(_) => {
                tracing::warn!(
                    connection_id = %conn.connection_id,
                    session_id = %payload.session_id,
                    attempt,
                    "join not answered in time"
                );
            }
        }
    }

    match outcome {
        Some(Ok(())) => {
            tracing::info!(
                connection_id = %conn.connection_id,
                session_id = %payload.session_id,
                user_id = %source_user_id,
                "join accepted"
            );
            conn.joined = Some(Joined {
                session_id: payload.session_id,
                user_id: source_user_id,
                handle,
            });
            Flow::Continue
        }
        Some(Err(code)) => {
            send_error(socket, conn, code, format!("join rejected: {code}")).await;
            Flow::Continue
        }
        None => {
            send_error(
                socket,
                conn,
                ErrorCode::Overloaded,
                "session did not answer the join in time",
            )
            .await;
            Flow::Continue
        }
    }
}

/// Report an error to this connection only.
async fn send_error(socket: &mut WebSocket, conn: &Connection, code: ErrorCode, message: impl Into<String>) {
    let frame = ServerEvent::error(code, message).to_frame(now_ms(), "server");
    conn.state.metrics.message_out();
    if socket.send(Message::Text(frame.into())).await.is_err() {
        tracing::debug!(
            connection_id = %conn.connection_id,
            code = %code,
            "error frame could not be delivered"
        );
    }
}
