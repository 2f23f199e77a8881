//! Statistics tracking for the intercept loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counters shared by every in-flight query.
#[derive(Default)]
pub struct Stats {
    requests: AtomicU64,
    forwarded: AtomicU64,
    blocked_list: AtomicU64,
    blocked_rule: AtomicU64,
    /// Queries answered with nothing: malformed payloads and upstream failures.
    dropped: AtomicU64,
    upstream_failures: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_forwarded(&self, elapsed: Duration) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.record_request(elapsed);
    }

    pub fn record_blocked_by_list(&self, elapsed: Duration) {
        self.blocked_list.fetch_add(1, Ordering::Relaxed);
        self.record_request(elapsed);
    }

    pub fn record_blocked_by_rule(&self, elapsed: Duration) {
        self.blocked_rule.fetch_add(1, Ordering::Relaxed);
        self.record_request(elapsed);
    }

    /// A query that could not be answered locally or forwarded.
    pub fn record_dropped(&self, elapsed: Duration) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.record_request(elapsed);
    }

    pub fn record_upstream_failure(&self, elapsed: Duration) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
        self.record_dropped(elapsed);
    }

    fn record_request(&self, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let blocked_list = self.blocked_list.swap(0, Ordering::Relaxed);
        let blocked_rule = self.blocked_rule.swap(0, Ordering::Relaxed);
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        let upstream_failures = self.upstream_failures.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            requests,
            forwarded,
            blocked_list,
            blocked_rule,
            dropped,
            upstream_failures,
            avg_response_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub forwarded: u64,
    pub blocked_list: u64,
    pub blocked_rule: u64,
    pub dropped: u64,
    pub upstream_failures: u64,
    pub avg_response_ms: f64,
}

impl StatsSnapshot {
    pub fn blocked(&self) -> u64 {
        self.blocked_list + self.blocked_rule
    }
}
