//! Observational counters for the coordination engine
//!
//! # Memory Ordering
//!
//! All counters use Relaxed ordering intentionally because:
//! 1. They are purely observational metrics for monitoring/debugging
//! 2. They do not synchronize any other memory operations
//! 3. Approximate counts are acceptable for metrics purposes
//! 4. The atomic operations guarantee no torn reads/writes
//!
//! Shipping these to a metrics backend is the embedder's job; this module
//! only accumulates and snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters accumulated across all transitions through one coordinator
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    /// Transitions that reached a terminal Success/MergeConflict outcome
    transitions_applied: AtomicU64,
    /// Attempts that gave up waiting for the lease
    lock_timeouts: AtomicU64,
    /// Attempts rejected by the conditional write
    version_conflicts: AtomicU64,
    /// Conflict markers recorded by merges
    merge_conflicts: AtomicU64,
    /// Calls that spent their whole retry budget
    retry_exhaustions: AtomicU64,
    /// Attempts that ended in a fatal error
    fatal_errors: AtomicU64,
    /// Audit appends that failed and fell back to the local log
    audit_write_failures: AtomicU64,
    /// Total milliseconds spent waiting for leases
    lock_wait_ms_total: AtomicU64,
    /// Number of lease waits measured (successful or not)
    lock_waits: AtomicU64,
}

impl CoordinatorMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_applied(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_version_conflict(&self) {
        self.version_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_merge_conflicts(&self, count: u64) {
        self.merge_conflicts.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_exhaustion(&self) {
        self.retry_exhaustions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fatal_error(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_audit_write_failure(&self) {
        self.audit_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_wait(&self, wait_ms: u64) {
        self.lock_wait_ms_total.fetch_add(wait_ms, Ordering::Relaxed);
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transitions_applied: self.transitions_applied.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            version_conflicts: self.version_conflicts.load(Ordering::Relaxed),
            merge_conflicts: self.merge_conflicts.load(Ordering::Relaxed),
            retry_exhaustions: self.retry_exhaustions.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
            audit_write_failures: self.audit_write_failures.load(Ordering::Relaxed),
            lock_wait_ms_total: self.lock_wait_ms_total.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the coordinator counters at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Transitions that reached a terminal Success/MergeConflict outcome
    pub transitions_applied: u64,
    /// Attempts that gave up waiting for the lease
    pub lock_timeouts: u64,
    /// Attempts rejected by the conditional write
    pub version_conflicts: u64,
    /// Conflict markers recorded by merges
    pub merge_conflicts: u64,
    /// Calls that spent their whole retry budget
    pub retry_exhaustions: u64,
    /// Attempts that ended in a fatal error
    pub fatal_errors: u64,
    /// Audit appends that failed and fell back to the local log
    pub audit_write_failures: u64,
    /// Total milliseconds spent waiting for leases
    pub lock_wait_ms_total: u64,
    /// Number of lease waits measured
    pub lock_waits: u64,
}

impl MetricsSnapshot {
    /// Mean lease wait in milliseconds, if any waits were measured
    pub fn mean_lock_wait_ms(&self) -> Option<f64> {
        if self.lock_waits == 0 {
            None
        } else {
            Some(self.lock_wait_ms_total as f64 / self.lock_waits as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = CoordinatorMetrics::new();
        metrics.record_applied();
        metrics.record_applied();
        metrics.record_version_conflict();
        metrics.record_merge_conflicts(3);
        metrics.record_lock_wait(10);
        metrics.record_lock_wait(30);

        let snap = metrics.snapshot();
        assert_eq!(snap.transitions_applied, 2);
        assert_eq!(snap.version_conflicts, 1);
        assert_eq!(snap.merge_conflicts, 3);
        assert_eq!(snap.lock_wait_ms_total, 40);
        assert_eq!(snap.mean_lock_wait_ms(), Some(20.0));
    }

    #[test]
    fn test_mean_lock_wait_without_samples() {
        let snap = CoordinatorMetrics::new().snapshot();
        assert_eq!(snap.mean_lock_wait_ms(), None);
    }
}
