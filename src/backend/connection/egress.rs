/**
 * Per-Recipient Egress Queue
 *
 * Every connection owns one bounded queue that its session actor pushes
 * broadcast frames into and its connection handler drains into the socket.
 * Single producer (the actor), single consumer (the handler writer).
 *
 * # Backpressure
 *
 * The queue is bounded so a stalled reader cannot stall the actor. When a
 * push finds the queue full, the actor drops that recipient: the handler is
 * told to kick the connection with `OVERLOADED` and the client resyncs on
 * reconnect.
 *
 * # Transform Coalescing
 *
 * A transform broadcast replaces an unsent transform for the same
 * `(object_id, source_user_id)` in place instead of appending. A slow
 * recipient therefore skips intermediate transforms but always ends on the
 * latest one; state and log are unaffected.
 */

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::shared::envelope::ErrorCode;

/// A frame queued for one recipient.
#[derive(Clone, Debug)]
pub struct EgressFrame {
    pub json: String,
    /// Present on transform broadcasts; frames with equal keys coalesce
    pub coalesce_key: Option<(Uuid, String)>,
}

impl EgressFrame {
    /// A frame that is never coalesced.
    pub fn frame(json: String) -> Self {
        Self {
            json,
            coalesce_key: None,
        }
    }

    /// A transform broadcast, coalescable per `(object_id, source_user_id)`.
    pub fn transform(json: String, object_id: Uuid, source_user_id: &str) -> Self {
        Self {
            json,
            coalesce_key: Some((object_id, source_user_id.to_string())),
        }
    }
}

/// The queue was full and the frame could not coalesce.
#[derive(Debug, PartialEq, Eq)]
pub struct EgressOverflow;

/// What the consumer sees next.
#[derive(Debug, PartialEq, Eq)]
pub enum EgressEvent {
    /// A frame to write to the socket
    Frame(String),
    /// The actor dropped this recipient; send the error and close
    Kick(ErrorCode),
    /// Clean shutdown; close without an error frame
    Closed,
}

#[derive(Debug)]
struct Inner {
    frames: VecDeque<EgressFrame>,
    kick: Option<ErrorCode>,
    closed: bool,
}

/// Bounded SPSC egress queue with in-place transform coalescing.
#[derive(Debug)]
pub struct EgressQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl EgressQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                frames: VecDeque::new(),
                kick: None,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a frame, coalescing transforms in place.
    pub fn push(&self, frame: EgressFrame) -> Result<(), EgressOverflow> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(key) = &frame.coalesce_key {
            if let Some(slot) = inner
                .frames
                .iter_mut()
                .find(|queued| queued.coalesce_key.as_ref() == Some(key))
            {
                *slot = frame;
                drop(inner);
                self.notify.notify_one();
                return Ok(());
            }
        }
        if inner.frames.len() >= self.capacity {
            return Err(EgressOverflow);
        }
        inner.frames.push_back(frame);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Tell the consumer to send an error frame and drop the connection.
    /// Delivered ahead of any queued frames.
    pub fn kick(&self, code: ErrorCode) {
        self.inner.lock().unwrap().kick = Some(code);
        self.notify.notify_one();
    }

    /// Clean close: the consumer drains nothing further and hangs up.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_one();
    }

    /// Wait for the next event. Kicks outrank queued frames: a recipient
    /// being dropped for slowness should not first be fed its backlog.
    pub async fn next(&self) -> EgressEvent {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(code) = inner.kick {
                    return EgressEvent::Kick(code);
                }
                if let Some(frame) = inner.frames.pop_front() {
                    return EgressEvent::Frame(frame.json);
                }
                if inner.closed {
                    return EgressEvent::Closed;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Number of queued frames (test/diagnostic use).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
