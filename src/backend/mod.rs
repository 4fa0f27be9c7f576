//! Backend Module
//!
//! This module contains all server-side code for the XFScene collaboration
//! server. It provides an Axum WebSocket server, the per-session actors that
//! own canonical scene state, durable event-log storage with crash recovery,
//! and the metrics endpoint.
//!
//! # Architecture
//!
//! ```text
//! backend/
//! ├── server/      - Server initialization, configuration, AppState
//! ├── connection/  - WebSocket handler, egress queues, rate limiting
//! ├── session/     - Session state, actors, registry
//! ├── storage/     - Event log store and recovery boot
//! ├── metrics/     - Counters, latency window, GET /metrics
//! └── error/       - Backend error types
//! ```
//!
//! A frame arrives at a connection handler, is parsed and rate-checked, and
//! is forwarded as a typed command to the owning session actor. The actor
//! mutates canonical state, appends accepted mutations to the event log, and
//! fans the broadcast out through each recipient's bounded egress queue. The
//! registry maps session names to actors and enforces the global session
//! cap; recovery primes it from disk at boot.
//!
//! # State Management
//!
//! There are no process-wide mutable singletons: the registry and metrics
//! handles are created at boot and passed into each task at spawn. All
//! mutation of a session's state happens inside that session's actor task,
//! so session state needs no locks at all.

/// Server setup and configuration
pub mod server;

/// Connection handling: WebSocket ingress/egress
pub mod connection;

/// Session state, actors, and registry
pub mod session;

/// Durable event log storage and recovery
pub mod storage;

/// Metrics and telemetry
pub mod metrics;

/// Backend error types
pub mod error;

/// Re-export commonly used types
pub use error::BackendError;
pub use metrics::Metrics;
pub use session::SessionRegistry;

/// Milliseconds since the Unix epoch, by the server's wall clock.
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
