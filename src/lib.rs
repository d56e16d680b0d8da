//! Ratchet - concurrency-control layer for workflow record mutations
//!
//! Operational records (work tickets, scheduled jobs, asset states) are
//! mutated concurrently by interactive handlers, background schedulers, and
//! retrying workers. Ratchet guarantees at-most-one effective writer per
//! entity version, detects and resolves conflicting partial updates to
//! JSON-valued fields, retries transient contention safely, and records an
//! immutable audit trail of every transition attempt.
//!
//! # Quick Start
//!
//! ```ignore
//! use ratchet::{
//!     Coordinator, CorrelationId, EntityRef, JsonDelta, TransitionOutput,
//! };
//! use serde_json::json;
//!
//! let coordinator = Coordinator::new(lease_store, entity_store, audit_store);
//!
//! let result = coordinator.apply_transition(
//!     &EntityRef::new("ticket", "42"),
//!     CorrelationId::new("req-7781"),
//!     |state, _blob| {
//!         let mut new_state = state.clone();
//!         new_state.insert("status".into(), json!("ESCALATED"));
//!         Ok(TransitionOutput::new(
//!             new_state,
//!             JsonDelta::new().set("__counters__", json!({"escalations": 1})),
//!         ))
//!     },
//! )?;
//! ```
//!
//! # Architecture
//!
//! The [`Coordinator`] orchestrates each mutation: lease acquisition
//! ([`LockManager`]), version-checked read and conditional write
//! ([`VersionGuard`]), the caller's pure transition function,
//! conflict-aware JSON merge ([`merge`]), audit recording, and bounded
//! retry ([`RetryExecutor`]). Backing stores are trait objects
//! ([`LeaseStore`], [`EntityStore`], [`AuditStore`]); in-memory reference
//! implementations live in [`store`].

// Re-export the public API from the layered crates
pub use ratchet_core::{
    AttemptOutcome, AuditRecord, AuditStore, ConflictMarker, ConflictResolution, CorrelationId,
    EntityRef, EntitySnapshot, EntityStore, Error, ErrorClass, HolderToken, JsonDelta, JsonMap,
    LeaseStore, Result, StateFields,
};

pub use ratchet_coordination::{
    merge, FieldSemantics, LeaseConfig, LeaseGuard, LockLease, LockManager, MergePolicy,
    MergeResult, RetryExecutor, RetryPolicy, VersionGuard, COUNTERS_KEY,
};

pub use ratchet_engine::{
    AuditRecorder, Coordinator, CoordinatorMetrics, MetricsSnapshot, TransitionOutput,
    TransitionResult,
};

/// In-memory reference implementations of the store contracts
pub mod store {
    pub use ratchet_store::{MemoryAuditStore, MemoryEntityStore, MemoryLeaseStore};
}
