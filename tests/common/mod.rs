//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Session/actor fixtures over temp data directories
//! - Egress-queue draining helpers
//! - Scene mutation builders

pub mod fixtures;

// Re-export commonly used utilities
pub use fixtures::*;
