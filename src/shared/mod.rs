//! Shared Module
//!
//! This module contains types and data structures that are shared between
//! the server and editor clients. These types define the wire protocol and
//! the scene object model; everything here is serialization-oriented and
//! free of server-side concerns.
//!
//! # Overview
//!
//! - `scene` - the scene object model: transforms, object kinds, per-kind
//!   property records, and the full `SceneObject` record with audit fields
//! - `user` - presence records and the fixed color palette
//! - `envelope` - the wire envelope, typed client/server events, and the
//!   error code set
//! - `error` - shared error types

/// Scene object model
pub mod scene;

/// User/presence records and color palette
pub mod user;

/// Wire envelope and typed events
pub mod envelope;

/// Shared error types
pub mod error;

/// Re-export commonly used types for convenience
pub use envelope::{ClientEvent, ClientFrame, ErrorCode, ServerEvent};
pub use error::SharedError;
pub use scene::{ObjectKind, ObjectProperties, SceneObject, Transform};
pub use user::{palette_color, User, COLOR_PALETTE};
