//! Request counters
//!
//! Counters only, monotonic, reset on process start. Relaxed ordering is
//! enough: readers only need eventually consistent values.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for the control API.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Every request that reached a handler
    requests: AtomicU64,
    /// Health and role checks answered
    health_checks: AtomicU64,
    /// Health and role checks answered with a non-200 status
    health_checks_failed: AtomicU64,
    /// Local status probes that exhausted their retries
    probe_failures: AtomicU64,
    /// Mutating requests refused by access control
    access_denied: AtomicU64,
    /// Switchover and failover requests received
    switchovers_requested: AtomicU64,
    /// Requests that ended with the leader moving or a schedule accepted
    switchovers_accepted: AtomicU64,
    /// Dynamic configuration writes performed
    config_writes: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a health check.
    pub fn record_health_check(&self, status: u16) {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
        if status != 200 {
            self.health_checks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_probe_failures(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_access_denied(&self) {
        self.access_denied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a switchover request and whether it was accepted.
    pub fn record_switchover(&self, status: u16) {
        self.switchovers_requested.fetch_add(1, Ordering::Relaxed);
        if status == 200 || status == 202 {
            self.switchovers_accepted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_config_writes(&self) {
        self.config_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            health_checks_failed: self.health_checks_failed.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            access_denied: self.access_denied.load(Ordering::Relaxed),
            switchovers_requested: self.switchovers_requested.load(Ordering::Relaxed),
            switchovers_accepted: self.switchovers_accepted.load(Ordering::Relaxed),
            config_writes: self.config_writes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub health_checks: u64,
    pub health_checks_failed: u64,
    pub probe_failures: u64,
    pub access_denied: u64,
    pub switchovers_requested: u64,
    pub switchovers_accepted: u64,
    pub config_writes: u64,
}

impl MetricsSnapshot {
    /// `(name, help, value)` for every counter.
    pub fn counters(&self) -> [(&'static str, &'static str, u64); 8] {
        [
            ("requests_total", "Requests handled by the REST API.", self.requests),
            ("health_checks_total", "Health and role checks answered.", self.health_checks),
            (
                "health_checks_failed_total",
                "Health and role checks answered with a non-200 status.",
                self.health_checks_failed,
            ),
            (
                "probe_failures_total",
                "Local PostgreSQL probes that exhausted their retries.",
                self.probe_failures,
            ),
            (
                "access_denied_total",
                "Mutating requests refused by access control.",
                self.access_denied,
            ),
            (
                "switchovers_requested_total",
                "Switchover and failover requests received.",
                self.switchovers_requested,
            ),
            (
                "switchovers_accepted_total",
                "Switchover and failover requests that succeeded or were scheduled.",
                self.switchovers_accepted,
            ),
            (
                "config_writes_total",
                "Dynamic configuration writes performed.",
                self.config_writes,
            ),
        ]
    }
}
