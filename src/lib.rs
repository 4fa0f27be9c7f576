// Increase recursion limit for complex async operations
#![recursion_limit = "256"]

//! XFScene - Main Library
//!
//! XFScene is an authoritative real-time collaboration server for shared 3D
//! scene editing. A small set of editor clients connect over WebSocket, join
//! named sessions, and exchange scene mutations (create/delete objects,
//! transform, property and name updates) which the server validates, resolves
//! with Last-Write-Wins semantics, persists to a durable event log, and fans
//! out to every other participant.
//!
//! # Overview
//!
//! This library provides the core functionality for XFScene, including:
//! - Per-session actors that serialize all mutations for one scene
//! - Last-Write-Wins conflict resolution on concurrent edits
//! - An append-only event log with snapshot-based compaction
//! - Crash recovery that rehydrates sessions from disk at boot
//! - Presence (join/leave, color assignment, selection broadcast)
//! - Metrics with propagation-latency percentiles
//!
//! # Module Structure
//!
//! The library is organized into two main modules:
//!
//! - **`shared`** - Types shared between server and editor clients
//!   - Wire envelope and typed client/server events
//!   - Scene object model (transforms, kinds, properties)
//!   - User/presence records and the color palette
//!   - Error codes and shared error types
//!
//! - **`backend`** - Server-side code
//!   - Axum WebSocket server with the `/ws` and `/metrics` endpoints
//!   - Session registry, per-session actors, canonical state
//!   - Durable event log storage and recovery boot
//!   - Connection handling, rate limiting, egress queues
//!
//! # Usage
//!
//! ```rust,no_run
//! use xfscene::backend::server::config::ServerConfig;
//! use xfscene::backend::server::init::create_app;
//!
//! # async fn example() {
//! let config = ServerConfig::from_env();
//! let (app, state) = create_app(config).await.expect("boot failed");
//! // Serve `app` with Axum, then `state.registry.shutdown_all().await`.
//! # }
//! ```

/// Types shared between server and editor clients
pub mod shared;

/// Server-side code
pub mod backend;
