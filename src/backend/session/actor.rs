/**
 * Session Actor
 *
 * One task per session, owning that session's canonical state and event
 * log. All mutations flow through the actor's mailbox and are processed
 * strictly serially, which is the ordering anchor of the system: every
 * observer of a session sees broadcasts derived from the same sequence of
 * accepted mutations, in the same order.
 *
 * Per command the pipeline is:
 *
 * 1. dispatch to the matching state transition
 * 2. append accepted mutations to the event log (log-and-continue on I/O
 *    failure: durability degrades, correctness does not)
 * 3. fan the broadcast out to every recipient's egress queue except the
 *    originator's
 * 4. record metrics and a structured tracing event
 *
 * A recipient whose egress queue is full is dropped with `OVERLOADED`
 * rather than allowed to stall the session.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::backend::connection::egress::{EgressFrame, EgressQueue};
use crate::backend::metrics::Metrics;
use crate::backend::now_ms;
use crate::backend::server::config::ServerConfig;
use crate::backend::session::state::{MutationOp, SessionState};
use crate::backend::storage::event_log::{EventLogStore, LogRecord};
use crate::shared::envelope::{ErrorCode, ServerEvent, UserJoinedPayload, UserLeftPayload};

// ── Commands ──────────────────────────────────────────────────────────────────

/// Typed commands accepted by a session actor's mailbox.
pub enum SessionCommand {
    /// Add a user and its egress queue; answers `FULL_STATE_SYNC` through
    /// the queue on success
    Join {
        user_id: String,
        display_name: String,
        egress: Arc<EgressQueue>,
        reply: oneshot::Sender<Result<(), ErrorCode>>,
    },
    /// Remove a user (explicit LEAVE_SESSION or synthetic on disconnect)
    Leave { user_id: String },
    /// A mutating scene command
    Mutate {
        user_id: String,
        timestamp_ms: u64,
        received_at: Instant,
        op: MutationOp,
    },
    /// Ephemeral selection change; broadcast but never logged
    Select {
        user_id: String,
        object_id: Option<Uuid>,
        received_at: Instant,
    },
    /// Drain, write a final snapshot, and stop
    Shutdown { done: oneshot::Sender<()> },
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable sender half of a session actor's mailbox.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Deliver a command in mailbox order. `false` means the actor is gone
    /// (server shutting down).
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }

    /// Ask the actor to finalize and wait until its snapshot is on disk.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send(SessionCommand::Shutdown { done: done_tx }).await {
            let _ = done_rx.await;
        }
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

/// The per-session task. Owns state, log, and the recipient set.
pub struct SessionActor {
    state: SessionState,
    /// `None` when the log could not be opened: the session keeps serving
    /// from memory with durability degraded
    store: Option<EventLogStore>,
    recipients: HashMap<String, Arc<EgressQueue>>,
    mailbox: mpsc::Receiver<SessionCommand>,
    metrics: Metrics,
    config: Arc<ServerConfig>,
}

impl SessionActor {
    /// Spawn the actor task and return its mailbox handle.
    pub fn spawn(
        state: SessionState,
        store: Option<EventLogStore>,
        metrics: Metrics,
        config: Arc<ServerConfig>,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let actor = SessionActor {
            state,
            store,
            recipients: HashMap::new(),
            mailbox: rx,
            metrics,
            config,
        };
        tokio::spawn(actor.run());
        SessionHandle { tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.mailbox.recv().await {
            match command {
                SessionCommand::Shutdown { done } => {
                    self.finalize();
                    let _ = done.send(());
                    return;
                }
                command => self.handle_command(command),
            }
        }
        // Every handle dropped without an explicit shutdown; still finalize.
        self.finalize();
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join {
                user_id,
                display_name,
                egress,
                reply,
            } => self.handle_join(user_id, display_name, egress, reply),
            SessionCommand::Leave { user_id } => self.handle_leave(&user_id),
            SessionCommand::Mutate {
                user_id,
                timestamp_ms,
                received_at,
                op,
            } => self.handle_mutate(&user_id, timestamp_ms, received_at, &op),
            SessionCommand::Select {
                user_id,
                object_id,
                received_at,
            } => self.handle_select(&user_id, object_id, received_at),
            SessionCommand::Shutdown { .. } => unreachable!("handled in run()"),
        }
    }

    // ── Presence ──────────────────────────────────────────────────────────

    fn handle_join(
        &mut self,
        user_id: String,
        display_name: String,
        egress: Arc<EgressQueue>,
        reply: oneshot::Sender<Result<(), ErrorCode>>,
    ) {
        let started = Instant::now();
        let now = now_ms();
        let joined: UserJoinedPayload = match self.state.join(
            &user_id,
            &display_name,
            now,
            self.config.max_users_per_session,
        ) {
            Ok(joined) => joined,
            Err(code) => {
                tracing::warn!(
                    event_type = "JOIN_SESSION",
                    session_id = %self.state.session_id(),
                    user_id = %user_id,
                    code = %code,
                    "join rejected"
                );
                let _ = reply.send(Err(code));
                return;
            }
        };

        // The sync frame goes first so the joiner never sees a broadcast it
        // has no base state for.
        let sync = self.state.full_state_sync().to_frame(now, "server");
        let _ = egress.push(EgressFrame::frame(sync));
        self.recipients.insert(user_id.clone(), egress);
        let _ = reply.send(Ok(()));

        let frame = ServerEvent::UserJoined(joined).to_frame(now, &user_id);
        self.fan_out(&user_id, EgressFrame::frame(frame), started);

        tracing::info!(
            event_type = "JOIN_SESSION",
            session_id = %self.state.session_id(),
            user_id = %user_id,
            display_name = %display_name,
            users = self.state.users().len(),
            duration_us = started.elapsed().as_micros() as u64,
            "user joined session"
        );
    }

    fn handle_leave(&mut self, user_id: &str) {
        let started = Instant::now();
        if self.state.leave(user_id).is_none() {
            // Synthetic leaves can race an overload kick; both paths are
            // idempotent.
            return;
        }
        self.recipients.remove(user_id);

        let frame = ServerEvent::UserLeft(UserLeftPayload {
            user_id: user_id.to_string(),
        })
        .to_frame(now_ms(), user_id);
        self.fan_out(user_id, EgressFrame::frame(frame), started);

        tracing::info!(
            event_type = "LEAVE_SESSION",
            session_id = %self.state.session_id(),
            user_id = %user_id,
            users = self.state.users().len(),
            "user left session"
        );
    }

    fn handle_select(&mut self, user_id: &str, object_id: Option<Uuid>, received_at: Instant) {
        let Some(event) = self.state.select(user_id, object_id) else {
            tracing::debug!(
                session_id = %self.state.session_id(),
                user_id = %user_id,
                "selection from user not in session; ignoring"
            );
            return;
        };
        let frame = event.to_frame(now_ms(), user_id);
        self.fan_out(user_id, EgressFrame::frame(frame), received_at);

        tracing::debug!(
            event_type = "SELECT_OBJECT",
            session_id = %self.state.session_id(),
            user_id = %user_id,
            object_id = ?object_id,
            "selection updated"
        );
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    fn handle_mutate(
        &mut self,
        user_id: &str,
        timestamp_ms: u64,
        received_at: Instant,
        op: &MutationOp,
    ) {
        let started = Instant::now();
        // A client clock far in the future must not win LWW indefinitely.
        let timestamp_ms = timestamp_ms.min(now_ms() + self.config.timestamp_slack_ms);

        let event = match self.state.apply_mutation(user_id, timestamp_ms, op) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(
                    event_type = op.kind(),
                    session_id = %self.state.session_id(),
                    user_id = %user_id,
                    object_id = %op.object_id(),
                    "stale or no-op mutation discarded"
                );
                return;
            }
            Err(code) => {
                tracing::warn!(
                    event_type = op.kind(),
                    session_id = %self.state.session_id(),
                    user_id = %user_id,
                    object_id = %op.object_id(),
                    code = %code,
                    "mutation rejected"
                );
                self.send_error(user_id, code, format!("{} rejected", op.kind()));
                return;
            }
        };

        let seq = self.state.last_seq();
        self.append_to_log(seq, timestamp_ms, user_id, op);

        let json = event.to_frame(timestamp_ms, user_id);
        let frame = match &event {
            ServerEvent::TransformUpdated(p) => EgressFrame::transform(json, p.object_id, user_id),
            _ => EgressFrame::frame(json),
        };
        self.fan_out(user_id, frame, received_at);

        tracing::info!(
            event_type = op.kind(),
            session_id = %self.state.session_id(),
            user_id = %user_id,
            object_id = %op.object_id(),
            seq,
            duration_us = started.elapsed().as_micros() as u64,
            "mutation applied"
        );
    }

    fn append_to_log(&mut self, seq: u64, timestamp_ms: u64, user_id: &str, op: &MutationOp) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let record = LogRecord {
            seq,
            timestamp_ms,
            user_id: user_id.to_string(),
            op: op.clone(),
        };
        if let Err(e) = store.append(&record) {
            tracing::error!(
                session_id = %self.state.session_id(),
                seq,
                error = %e,
                "event log append failed; continuing with durability degraded"
            );
            return;
        }
        if store.appended_since_snapshot() >= self.config.snapshot_every {
            if let Err(e) = store.snapshot(&self.state.snapshot()) {
                tracing::error!(
                    session_id = %self.state.session_id(),
                    error = %e,
                    "snapshot compaction failed; log keeps growing"
                );
            }
        }
    }

    // ── Fan-out ───────────────────────────────────────────────────────────

    /// Deliver a broadcast to every recipient except the originator, in a
    /// stable order per recipient. Queue overflow drops that recipient only.
    fn fan_out(&mut self, originator: &str, frame: EgressFrame, received_at: Instant) {
        let mut overflowed = Vec::new();
        for (user_id, queue) in &self.recipients {
            if user_id == originator {
                continue;
            }
            if queue.push(frame.clone()).is_err() {
                overflowed.push(user_id.clone());
            }
        }
        self.metrics.record_fanout_latency(received_at.elapsed());

        for user_id in overflowed {
            self.drop_overloaded(&user_id);
        }
    }

    fn drop_overloaded(&mut self, user_id: &str) {
        if self.state.leave(user_id).is_none() {
            return;
        }
        if let Some(queue) = self.recipients.remove(user_id) {
            queue.kick(ErrorCode::Overloaded);
        }
        tracing::warn!(
            session_id = %self.state.session_id(),
            user_id = %user_id,
            "egress queue overflowed; dropping slowest recipient"
        );
        let frame = ServerEvent::UserLeft(UserLeftPayload {
            user_id: user_id.to_string(),
        })
        .to_frame(now_ms(), user_id);
        self.fan_out(user_id, EgressFrame::frame(frame), Instant::now());
    }

    fn send_error(&self, user_id: &str, code: ErrorCode, message: String) {
        if let Some(queue) = self.recipients.get(user_id) {
            let frame = ServerEvent::error(code, message).to_frame(now_ms(), "server");
            let _ = queue.push(EgressFrame::frame(frame));
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────

    fn finalize(&mut self) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.snapshot(&self.state.snapshot()) {
                tracing::error!(
                    session_id = %self.state.session_id(),
                    error = %e,
                    "final snapshot failed"
                );
            }
        }
        for queue in self.recipients.values() {
            queue.close();
        }
        tracing::info!(
            session_id = %self.state.session_id(),
            objects = self.state.objects().len(),
            "session actor stopped"
        );
    }
}
