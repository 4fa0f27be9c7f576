//! Durable storage: per-session event logs, snapshots, and recovery boot.

/// Append-only event log with snapshot compaction
pub mod event_log;

/// Startup recovery of persisted sessions
pub mod recovery;

pub use event_log::{EventLogStore, LogRecord};
pub use recovery::{recover_sessions, RecoveredSession};
