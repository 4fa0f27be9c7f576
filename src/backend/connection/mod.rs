//! Per-connection ingress/egress: the WebSocket handler, the bounded egress
//! queue each recipient drains, and the message-rate token bucket.

/// WebSocket connection handler
pub mod handler;

/// Bounded per-recipient egress queue
pub mod egress;

/// Per-connection rate limiting
pub mod rate_limit;

pub use egress::{EgressEvent, EgressFrame, EgressQueue};
pub use handler::ws_handler;
pub use rate_limit::TokenBucket;
