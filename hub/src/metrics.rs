//! Metrics collection for hub monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hub metrics.
pub struct HubMetrics {
    /// Currently registered subscribers.
    pub subscribers_active: AtomicU64,
    /// Subscribers rejected because the first snapshot could not be produced.
    pub subscribers_rejected: AtomicU64,
    /// Refresh cycles started.
    pub refreshes_total: AtomicU64,
    /// Refresh cycles that failed.
    pub refreshes_failed: AtomicU64,
    /// Update events queued for at least one subscriber.
    pub updates_broadcast: AtomicU64,
    /// Events queued to subscriber channels.
    pub events_delivered: AtomicU64,
    /// Events dropped because a subscriber channel was full or closed.
    pub events_dropped: AtomicU64,
    /// Refresh timers armed.
    pub timers_armed: AtomicU64,
    /// Refresh timers cancelled before firing.
    pub timers_cancelled: AtomicU64,
}

impl HubMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            subscribers_active: AtomicU64::new(0),
            subscribers_rejected: AtomicU64::new(0),
            refreshes_total: AtomicU64::new(0),
            refreshes_failed: AtomicU64::new(0),
            updates_broadcast: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            timers_armed: AtomicU64::new(0),
            timers_cancelled: AtomicU64::new(0),
        }
    }

    /// Set active subscriber count.
    pub fn set_subscribers_active(&self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.subscribers_active.store(count, Ordering::Relaxed);
    }

    /// Record a subscriber that could not be served.
    pub fn subscriber_rejected(&self) {
        self.subscribers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refresh cycle start.
    pub fn refresh_started(&self) {
        self.refreshes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refresh failure.
    pub fn refresh_failed(&self) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an update broadcast.
    pub fn update_broadcast(&self) {
        self.updates_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event queued for a subscriber.
    pub fn event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event that could not be queued.
    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timer armed.
    pub fn timer_armed(&self) {
        self.timers_armed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timer cancelled.
    pub fn timer_cancelled(&self) {
        self.timers_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            subscribers_active: self.subscribers_active.load(Ordering::Relaxed),
            subscribers_rejected: self.subscribers_rejected.load(Ordering::Relaxed),
            refreshes_total: self.refreshes_total.load(Ordering::Relaxed),
            refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
            updates_broadcast: self.updates_broadcast.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            timers_armed: self.timers_armed.load(Ordering::Relaxed),
            timers_cancelled: self.timers_cancelled.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let series: [(&str, &str, &str, u64); 9] = [
            (
                "subscribers_active",
                "gauge",
                "Current registered subscribers",
                snapshot.subscribers_active,
            ),
            (
                "subscribers_rejected",
                "counter",
                "Subscribers rejected on join",
                snapshot.subscribers_rejected,
            ),
            (
                "refreshes_total",
                "counter",
                "Total refresh cycles started",
                snapshot.refreshes_total,
            ),
            (
                "refreshes_failed",
                "counter",
                "Total failed refresh cycles",
                snapshot.refreshes_failed,
            ),
            (
                "updates_broadcast",
                "counter",
                "Total updates queued for at least one subscriber",
                snapshot.updates_broadcast,
            ),
            (
                "events_delivered",
                "counter",
                "Total events queued to subscribers",
                snapshot.events_delivered,
            ),
            (
                "events_dropped",
                "counter",
                "Total events dropped on full or closed channels",
                snapshot.events_dropped,
            ),
            (
                "timers_armed",
                "counter",
                "Total refresh timers armed",
                snapshot.timers_armed,
            ),
            (
                "timers_cancelled",
                "counter",
                "Total refresh timers cancelled",
                snapshot.timers_cancelled,
            ),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in series {
            output.push_str(&format!("# HELP ratecast_{name} {help}\n"));
            output.push_str(&format!("# TYPE ratecast_{name} {kind}\n"));
            output.push_str(&format!("ratecast_{name} {value}\n\n"));
        }
        output
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub subscribers_active: u64,
    pub subscribers_rejected: u64,
    pub refreshes_total: u64,
    pub refreshes_failed: u64,
    pub updates_broadcast: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub timers_armed: u64,
    pub timers_cancelled: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<HubMetrics>;
