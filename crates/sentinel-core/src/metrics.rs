//! Global atomic counters for dispatch and rollback activity.
//!
//! Counters are bumped silently at the call site. [`Metrics::flush`] emits
//! the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    events_dispatched: AtomicU64,
    handler_runs: AtomicU64,
    handler_failures: AtomicU64,
    rollbacks_proposed: AtomicU64,
    rollback_fallbacks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_dispatched: AtomicU64::new(0),
            handler_runs: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            rollbacks_proposed: AtomicU64::new(0),
            rollback_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn inc_events_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_dispatched", "counter incremented");
    }

    pub fn inc_handler_runs(&self) {
        self.handler_runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "handler_runs", "counter incremented");
    }

    pub fn inc_handler_failures(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "handler_failures", "counter incremented");
    }

    /// A review branch and pull request were created.
    pub fn inc_rollbacks_proposed(&self) {
        self.rollbacks_proposed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks_proposed", "counter incremented");
    }

    /// The executor had to hand back manual instructions.
    pub fn inc_rollback_fallbacks(&self) {
        self.rollback_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollback_fallbacks", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            events_dispatched = self.events_dispatched(),
            handler_runs = self.handler_runs(),
            handler_failures = self.handler_failures(),
            rollbacks_proposed = self.rollbacks_proposed(),
            rollback_fallbacks = self.rollback_fallbacks(),
        );
    }

    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    pub fn handler_runs(&self) -> u64 {
        self.handler_runs.load(Ordering::Relaxed)
    }

    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    pub fn rollbacks_proposed(&self) -> u64 {
        self.rollbacks_proposed.load(Ordering::Relaxed)
    }

    pub fn rollback_fallbacks(&self) -> u64 {
        self.rollback_fallbacks.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.events_dispatched.store(0, Ordering::Relaxed);
        self.handler_runs.store(0, Ordering::Relaxed);
        self.handler_failures.store(0, Ordering::Relaxed);
        self.rollbacks_proposed.store(0, Ordering::Relaxed);
        self.rollback_fallbacks.store(0, Ordering::Relaxed);
    }
}
