//! Per-connection message-rate limiting.
//!
//! A plain token bucket: capacity 100, refilling at 100 tokens/s, one token
//! per inbound frame. Overflow is answered with a `RATE_LIMITED` error frame
//! and the connection is closed; a client pushing past this is broken or
//! hostile.

use std::time::Instant;

/// Token bucket over a monotonic clock.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    /// Take one token; `false` means the caller is over its rate.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
            .min(self.capacity);
        self.last_refill = now;
    }

    /// Clock-injectable form of [`try_acquire`](Self::try_acquire).
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
