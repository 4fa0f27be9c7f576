//! Server setup: configuration, shared application state, and router
//! assembly.

/// Environment-based configuration
pub mod config;

/// Router and application assembly
pub mod init;

/// Shared application state
pub mod state;

pub use config::ServerConfig;
pub use init::create_app;
pub use state::AppState;
