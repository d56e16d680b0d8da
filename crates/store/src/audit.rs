//! In-memory append-only audit store
//!
//! Records accumulate in append order and are never updated or deleted.
//! A failure toggle lets tests exercise the recorder's fallback path
//! without a real outage.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ratchet_core::{AttemptOutcome, AuditRecord, AuditStore, EntityRef, Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-local [`AuditStore`] backed by an append-only vector
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemoryAuditStore {
    /// Create an empty audit store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail (or stop failing)
    ///
    /// Test hook for the recorder's fallback-channel contract.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total records appended
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True if nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, record: AuditRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable(
                "audit store unavailable".to_string(),
            ));
        }
        self.records.lock().push(record);
        Ok(())
    }

    fn for_entity(&self, entity: &EntityRef) -> Result<Vec<AuditRecord>> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|r| r.entity_type == entity.entity_type && r.entity_id == entity.entity_id)
            .cloned()
            .collect())
    }

    fn by_outcome(
        &self,
        outcome: AttemptOutcome,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|r| r.outcome == outcome && r.timestamp >= from && r.timestamp < until)
            .cloned()
            .collect())
    }

    fn by_correlation(&self, correlation_id: &str) -> Result<Vec<AuditRecord>> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|r| r.correlation_id.as_str() == correlation_id)
            .cloned()
            .collect())
    }
}
