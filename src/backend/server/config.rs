/**
 * Server Configuration
 *
 * Configuration is loaded from environment variables with sensible defaults
 * for local development. Invalid values are logged and replaced by the
 * default; a bad environment never prevents startup.
 *
 * | Variable                | Default | Meaning                          |
 * |-------------------------|---------|----------------------------------|
 * | `SERVER_PORT`           | `8000`  | TCP port to bind                 |
 * | `DATA_DIR`              | `data`  | Event log / snapshot directory   |
 * | `MAX_SESSIONS`          | `20`    | Global live-session cap          |
 * | `MAX_USERS_PER_SESSION` | `10`    | Per-session user cap             |
 *
 * The remaining knobs (queue capacities, rate limits, timeouts) are fixed
 * protocol parameters and only vary in tests.
 */

use std::path::PathBuf;
use std::time::Duration;

/// All tunables for one server process.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// TCP port to bind
    pub port: u16,
    /// Directory holding `<session_id>.log` and `<session_id>.snapshot.json`
    pub data_dir: PathBuf,
    /// Global cap on live sessions
    pub max_sessions: usize,
    /// Per-session cap on concurrent users
    pub max_users_per_session: usize,
    /// Session actor mailbox capacity
    pub mailbox_capacity: usize,
    /// Per-recipient egress queue capacity
    pub egress_capacity: usize,
    /// Token bucket size for inbound frames
    pub rate_burst: u32,
    /// Token bucket refill rate, frames per second
    pub messages_per_sec: f64,
    /// Snapshot + truncate after this many appended log entries
    pub snapshot_every: u64,
    /// Quiet period before the server pings a connection
    pub idle_ping: Duration,
    /// How long after a ping the pong may take
    pub pong_grace: Duration,
    /// How long a JOIN may wait on the session actor, per attempt
    pub join_timeout: Duration,
    /// Accepted client timestamps are clamped to `now + slack`
    pub timestamp_slack_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            data_dir: PathBuf::from("data"),
            max_sessions: 20,
            max_users_per_session: 10,
            mailbox_capacity: 256,
            egress_capacity: 1024,
            rate_burst: 100,
            messages_per_sec: 100.0,
            snapshot_every: 1000,
            idle_ping: Duration::from_secs(120),
            pong_grace: Duration::from_secs(30),
            join_timeout: Duration::from_secs(2),
            timestamp_slack_ms: 5_000,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable env value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl ServerConfig {
    /// Load configuration from the environment on top of the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parsed("SERVER_PORT", defaults.port),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_sessions: env_parsed("MAX_SESSIONS", defaults.max_sessions),
            max_users_per_session: env_parsed(
                "MAX_USERS_PER_SESSION",
                defaults.max_users_per_session,
            ),
            ..defaults
        }
    }
}
