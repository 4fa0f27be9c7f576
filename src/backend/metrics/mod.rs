/**
 * Metrics & Telemetry
 *
 * Process-wide counters and gauges plus a rolling window of broadcast
 * propagation latencies, exposed as a JSON document at `GET /metrics`.
 *
 * Latency is measured per fan-out as `egress_enqueue_time -
 * command_receive_time` and summarized as p50/p95/p99 over the last 1,000
 * fan-outs.
 *
 * The handle is cheap to clone and is passed into every task at spawn;
 * there is no global mutable singleton.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Rolling latency window size, in fan-outs.
const LATENCY_WINDOW: usize = 1000;

#[derive(Default)]
struct MetricsInner {
    active_sessions: AtomicU64,
    active_connections: AtomicU64,
    messages_in_total: AtomicU64,
    messages_out_total: AtomicU64,
    transform_updates_total: AtomicU64,
    latencies_us: Mutex<VecDeque<u64>>,
}

/// Shared metrics handle.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.inner.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.inner.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.inner.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.inner.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_in(&self) {
        self.inner.messages_in_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_out(&self) {
        self.inner.messages_out_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transform_update(&self) {
        self.inner
            .transform_updates_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record one broadcast fan-out's propagation latency.
    pub fn record_fanout_latency(&self, latency: Duration) {
        let mut window = self.inner.latencies_us.lock().unwrap();
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency.as_micros() as u64);
    }

    /// A consistent point-in-time snapshot for `GET /metrics`.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut samples: Vec<u64> = {
            let window = self.inner.latencies_us.lock().unwrap();
            window.iter().copied().collect()
        };
        samples.sort_unstable();

        MetricsSnapshot {
            active_sessions: self.inner.active_sessions.load(Ordering::Relaxed),
            active_connections: self.inner.active_connections.load(Ordering::Relaxed),
            messages_in_total: self.inner.messages_in_total.load(Ordering::Relaxed),
            messages_out_total: self.inner.messages_out_total.load(Ordering::Relaxed),
            transform_updates_total: self.inner.transform_updates_total.load(Ordering::Relaxed),
            latency_us: LatencySummary {
                samples: samples.len() as u64,
                p50: percentile(&samples, 50.0),
                p95: percentile(&samples, 95.0),
                p99: percentile(&samples, 99.0),
            },
        }
    }
}

/// Nearest-rank percentile over a sorted slice; 0 when empty.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// The `GET /metrics` document.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MetricsSnapshot {
    pub active_sessions: u64,
    pub active_connections: u64,
    pub messages_in_total: u64,
    pub messages_out_total: u64,
    pub transform_updates_total: u64,
    pub latency_us: LatencySummary,
}

/// Propagation latency percentiles over the rolling window, in microseconds.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

/// `GET /metrics`
pub async fn metrics_handler(State(metrics): State<Metrics>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}
