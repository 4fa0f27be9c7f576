//! Session Module
//!
//! Everything that owns canonical scene state lives here:
//!
//! - `state` - the pure per-session data structure and its transitions
//! - `actor` - the task that serializes all mutations for one session and
//!   fans accepted broadcasts out to recipients
//! - `registry` - the process-wide directory of session actors
//!
//! The ordering anchor of the whole system is the actor's mailbox: within a
//! session, every observer sees broadcasts derived from the same sequence of
//! accepted mutations.

/// Pure canonical session state
pub mod state;

/// Per-session actor task and commands
pub mod actor;

/// Process-wide session directory
pub mod registry;

pub use actor::{SessionActor, SessionCommand, SessionHandle};
pub use registry::SessionRegistry;
pub use state::{MutationOp, SessionSnapshot, SessionState};
