//! Audit records and conflict markers
//!
//! Every transition attempt (success, conflict, or failure) produces
//! exactly one [`AuditRecord`]. Records are append-only: created once,
//! never updated or deleted. Their value is precisely in showing
//! contention, not just outcomes.

use crate::types::CorrelationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal classification of one transition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Write applied; version advanced by one
    Success,
    /// Conditional write rejected by a concurrent writer
    VersionConflict,
    /// Lease not acquired within the wait budget
    LockTimeout,
    /// Write applied, but at least one key needed conflict resolution
    ///
    /// Not an error: a recorded fact within a successful write.
    MergeConflict,
    /// Transition function rejected, or storage failed
    FatalError,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptOutcome::Success => "SUCCESS",
            AttemptOutcome::VersionConflict => "VERSION_CONFLICT",
            AttemptOutcome::LockTimeout => "LOCK_TIMEOUT",
            AttemptOutcome::MergeConflict => "MERGE_CONFLICT",
            AttemptOutcome::FatalError => "FATAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// How a concurrent divergent write to one key was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// The delta's value replaced the concurrently written value
    LastWriterWins,
    /// Counter semantics: the delta was added to the current value
    Accumulated,
}

/// Record of one key that was concurrently modified by another writer
///
/// The overwritten value is preserved here for audit and potential manual
/// reconciliation; the merged blob itself only carries the winning value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictMarker {
    /// The contended top-level key
    pub key: String,
    /// Value another writer persisted between our read and write
    pub overwritten: serde_json::Value,
    /// Value our delta proposed (and which won)
    pub applied: serde_json::Value,
    /// Resolution taken
    pub resolution: ConflictResolution,
}

/// Immutable record of one transition attempt
///
/// Queryable by entity (full history), by outcome within a time window
/// (contention analysis), and by correlation id (cross-system tracing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Caller-supplied or generated tracing id
    pub correlation_id: CorrelationId,
    /// Entity type discriminator
    pub entity_type: String,
    /// Entity identifier
    pub entity_id: String,
    /// 1-based attempt counter within one apply_transition call
    pub attempt_number: u32,
    /// Version observed at read time (None if the read never happened)
    pub from_version: Option<u64>,
    /// Version after a successful write; None on failure
    pub to_version: Option<u64>,
    /// Terminal classification of this attempt
    pub outcome: AttemptOutcome,
    /// Keys that needed conflict resolution (possibly empty)
    pub conflict_markers: Vec<ConflictMarker>,
    /// Time spent waiting for the lease
    pub lock_wait_ms: u64,
    /// Wall-clock duration of the whole attempt
    pub total_duration_ms: u64,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(outcome: AttemptOutcome) -> AuditRecord {
        AuditRecord {
            correlation_id: CorrelationId::new("req-1"),
            entity_type: "ticket".to_string(),
            entity_id: "42".to_string(),
            attempt_number: 1,
            from_version: Some(3),
            to_version: match outcome {
                AttemptOutcome::Success | AttemptOutcome::MergeConflict => Some(4),
                _ => None,
            },
            outcome,
            conflict_markers: vec![],
            lock_wait_ms: 12,
            total_duration_ms: 40,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_display_matches_wire_names() {
        assert_eq!(AttemptOutcome::Success.to_string(), "SUCCESS");
        assert_eq!(
            AttemptOutcome::VersionConflict.to_string(),
            "VERSION_CONFLICT"
        );
        assert_eq!(AttemptOutcome::LockTimeout.to_string(), "LOCK_TIMEOUT");
        assert_eq!(AttemptOutcome::MergeConflict.to_string(), "MERGE_CONFLICT");
        assert_eq!(AttemptOutcome::FatalError.to_string(), "FATAL_ERROR");
    }

    #[test]
    fn test_failed_attempt_has_no_to_version() {
        let record = sample_record(AttemptOutcome::VersionConflict);
        assert_eq!(record.to_version, None);
        assert_eq!(record.from_version, Some(3));
    }

    #[test]
    fn test_record_serde_round_trip() {
        let mut record = sample_record(AttemptOutcome::MergeConflict);
        record.conflict_markers.push(ConflictMarker {
            key: "notes".to_string(),
            overwritten: json!({"a": "x"}),
            applied: json!({"a": "y"}),
            resolution: ConflictResolution::LastWriterWins,
        });

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: AuditRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_marker_preserves_both_values() {
        let marker = ConflictMarker {
            key: "severity".to_string(),
            overwritten: json!("high"),
            applied: json!("critical"),
            resolution: ConflictResolution::LastWriterWins,
        };
        assert_ne!(marker.overwritten, marker.applied);
    }
}
