//! Audit recording with a local fallback channel
//!
//! Exactly one record is appended per transition attempt, failures and
//! conflicts included. An audit-store outage must never block business
//! progress, but it must not drop records silently either: a failed append
//! is written to the process-local structured log on the `ratchet::audit`
//! target and counted, so audit gaps are at least locally observable.

use crate::metrics::CoordinatorMetrics;
use ratchet_core::{AuditRecord, AuditStore};
use std::sync::Arc;
use tracing::{debug, error};

/// Appends attempt records, swallowing (but surfacing) store failures
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    metrics: Arc<CoordinatorMetrics>,
}

impl AuditRecorder {
    /// Create a recorder over an audit store
    pub fn new(store: Arc<dyn AuditStore>, metrics: Arc<CoordinatorMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Append one attempt record; fire-and-forget for the caller
    pub fn record(&self, record: AuditRecord) {
        debug!(
            target: "ratchet::audit",
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            correlation_id = %record.correlation_id,
            attempt = record.attempt_number,
            outcome = %record.outcome,
            "transition attempt"
        );

        if let Err(e) = self.store.append(record.clone()) {
            self.metrics.record_audit_write_failure();
            // Fallback channel: the full record lands in the local log so
            // the gap in the audit store is reconstructable.
            error!(
                target: "ratchet::audit",
                error = %e,
                record = %serde_json::to_string(&record).unwrap_or_else(|_| format!("{record:?}")),
                "audit append failed; record preserved in local log only"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ratchet_core::{AttemptOutcome, CorrelationId, EntityRef};
    use ratchet_store::MemoryAuditStore;

    fn sample_record() -> AuditRecord {
        AuditRecord {
            correlation_id: CorrelationId::new("req-1"),
            entity_type: "ticket".to_string(),
            entity_id: "42".to_string(),
            attempt_number: 1,
            from_version: Some(1),
            to_version: Some(2),
            outcome: AttemptOutcome::Success,
            conflict_markers: vec![],
            lock_wait_ms: 0,
            total_duration_ms: 3,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_record_appends_to_store() {
        let store = Arc::new(MemoryAuditStore::new());
        let metrics = Arc::new(CoordinatorMetrics::new());
        let recorder = AuditRecorder::new(store.clone(), metrics.clone());

        recorder.record(sample_record());

        let history = store.for_entity(&EntityRef::new("ticket", "42")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(metrics.snapshot().audit_write_failures, 0);
    }

    #[test]
    fn test_store_failure_is_swallowed_and_counted() {
        let store = Arc::new(MemoryAuditStore::new());
        let metrics = Arc::new(CoordinatorMetrics::new());
        let recorder = AuditRecorder::new(store.clone(), metrics.clone());

        store.set_failing(true);
        recorder.record(sample_record());

        assert!(store.is_empty());
        assert_eq!(metrics.snapshot().audit_write_failures, 1);
    }
}
