//! Per-client admission control.
//!
//! Fixed-window counters keyed by client identity (typically the remote
//! address). Each client's window starts with its first request; once
//! `max_requests` have been admitted, further requests are rejected
//! until the window elapses.
//!
//! Counters live in a sharded [`DashMap`], so concurrent admits for
//! different clients rarely contend and admits for the same client are
//! serialised on its shard. Expired windows are purged once the map
//! grows past `purge_threshold`, at most once per window, bounding memory
//! under address churn.

use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;

/// Configuration for admission control.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Window length. Default: 60s.
    pub window: Duration,
    /// Requests admitted per client per window. Default: 20.
    pub max_requests: u32,
    /// Tracked-client count that triggers a purge of expired windows.
    /// Default: 10,000.
    pub purge_threshold: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 20,
            purge_threshold: 10_000,
        }
    }
}

impl AdmissionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn max_requests(mut self, n: u32) -> Self {
        self.max_requests = n;
        self
    }

    pub fn purge_threshold(mut self, n: usize) -> Self {
        self.purge_threshold = n;
        self
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; `remaining` more requests fit in the current window.
    Allowed { remaining: u32 },
    /// Over the limit until the window resets.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Thread-safe per-client request gate.
pub struct AdmissionController {
    windows: DashMap<String, Window>,
    config: AdmissionConfig,
    last_purge: Mutex<Option<Instant>>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
            last_purge: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Count a request from `client_id` and decide whether it may proceed.
    pub fn admit(&self, client_id: &str) -> Admission {
        let now = Instant::now();
        if self.windows.len() > self.config.purge_threshold {
            self.maybe_purge(now);
        }

        let decision = {
            let mut window = self
                .windows
                .entry(client_id.to_owned())
                .or_insert(Window {
                    started: now,
                    count: 0,
                });
            let elapsed = now.saturating_duration_since(window.started);
            if elapsed >= self.config.window {
                window.started = now;
                window.count = 0;
            }
            if window.count < self.config.max_requests {
                window.count += 1;
                Admission::Allowed {
                    remaining: self.config.max_requests - window.count,
                }
            } else {
                let elapsed = now.saturating_duration_since(window.started);
                Admission::Rejected {
                    retry_after: self.config.window.saturating_sub(elapsed),
                }
            }
        };

        if let Admission::Rejected { retry_after } = decision {
            metrics::counter!(telemetry::ADMISSION_REJECTED_TOTAL).increment(1);
            debug!(client = client_id, ?retry_after, "admission rejected");
        }
        decision
    }

    /// Purge unless another purge ran within the last window.
    fn maybe_purge(&self, now: Instant) {
        // Skip when another admit holds the lock; it is purging already.
        let Ok(mut last) = self.last_purge.try_lock() else {
            return;
        };
        if last.is_some_and(|at| now.saturating_duration_since(at) < self.config.window) {
            return;
        }
        *last = Some(now);
        drop(last);
        self.purge_expired();
    }

    /// Drop clients whose window has elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
