//! Coordinator facade for guarded entity mutations
//!
//! One `apply_transition` call walks a fixed per-attempt sequence:
//!
//! ```text
//! LOCKING → READING → EXECUTING → MERGING → WRITING → RECORDING
//! ```
//!
//! - `LOCKING` failure (timeout) retries if attempts remain.
//! - `WRITING` failure (version conflict) releases the lease, then retries
//!   with a fresh read.
//! - Any error from the caller's transition function during `EXECUTING` is
//!   fatal: the lease is released, the attempt is recorded, and the error
//!   propagates without consuming the remaining retry budget.
//! - `RECORDING` runs on the way to every terminal outcome, exhausted
//!   retries included, and happens before the lease is released so audit
//!   records land in write order.
//!
//! The transition function must be a pure function of its inputs: it is
//! re-invoked against a fresh snapshot on every retry.

use crate::audit::AuditRecorder;
use crate::metrics::{CoordinatorMetrics, MetricsSnapshot};
use chrono::Utc;
use parking_lot::RwLock;
use ratchet_coordination::{
    merge, LeaseConfig, LockManager, MergePolicy, RetryExecutor, RetryPolicy, VersionGuard,
};
use ratchet_core::{
    AttemptOutcome, AuditRecord, AuditStore, ConflictMarker, CorrelationId, EntityRef,
    EntitySnapshot, EntityStore, Error, JsonDelta, JsonMap, LeaseStore, Result, StateFields,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What a transition function proposes: new scalar state plus a JSON delta
#[derive(Debug, Clone)]
pub struct TransitionOutput {
    /// Replacement scalar attributes
    pub state_fields: StateFields,
    /// Partial update to the JSON blob, merged conflict-aware
    pub delta: JsonDelta,
}

impl TransitionOutput {
    /// Bundle new state fields with a delta
    pub fn new(state_fields: StateFields, delta: JsonDelta) -> Self {
        Self {
            state_fields,
            delta,
        }
    }
}

/// Terminal result of a successful `apply_transition` call
#[derive(Debug, Clone)]
pub struct TransitionResult {
    /// `Success`, or `MergeConflict` when the write landed with markers
    pub outcome: AttemptOutcome,
    /// Version the winning write produced
    pub new_version: u64,
    /// Conflicts resolved by the winning write (possibly empty)
    pub conflict_markers: Vec<ConflictMarker>,
    /// Attempts performed, first try included
    pub attempts: u32,
    /// Wall-clock duration of the whole call
    pub total_duration_ms: u64,
}

/// Outcome of one attempt that reached a successful write
struct AttemptSuccess {
    new_version: u64,
    conflict_markers: Vec<ConflictMarker>,
    outcome: AttemptOutcome,
}

/// Public entry point: orchestrates lease, read, transition, merge, write,
/// audit, and retry for one entity mutation at a time
pub struct Coordinator {
    locks: LockManager,
    versions: VersionGuard,
    audit_store: Arc<dyn AuditStore>,
    recorder: AuditRecorder,
    retry_policy: RetryPolicy,
    merge_policies: RwLock<HashMap<String, MergePolicy>>,
    metrics: Arc<CoordinatorMetrics>,
}

impl Coordinator {
    /// Create a coordinator over the three external stores, with default
    /// lease and retry configuration
    pub fn new(
        lease_store: Arc<dyn LeaseStore>,
        entity_store: Arc<dyn EntityStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        let metrics = Arc::new(CoordinatorMetrics::new());
        Self {
            locks: LockManager::new(lease_store, LeaseConfig::default()),
            versions: VersionGuard::new(entity_store),
            recorder: AuditRecorder::new(audit_store.clone(), metrics.clone()),
            audit_store,
            retry_policy: RetryPolicy::default(),
            merge_policies: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Replace the lease configuration
    pub fn with_lease_config(mut self, config: LeaseConfig) -> Self {
        let store = self.locks.store().clone();
        self.locks = LockManager::new(store, config);
        self
    }

    /// Replace the default retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Register the merge policy for one entity type (builder form)
    pub fn with_merge_policy(self, entity_type: impl Into<String>, policy: MergePolicy) -> Self {
        self.register_merge_policy(entity_type, policy);
        self
    }

    /// Register or replace the merge policy for one entity type
    ///
    /// Unregistered types get replace-everything semantics; the reserved
    /// `__counters__` namespace accumulates regardless.
    pub fn register_merge_policy(&self, entity_type: impl Into<String>, policy: MergePolicy) {
        self.merge_policies.write().insert(entity_type.into(), policy);
    }

    /// The audit store, for the read-only query interface
    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit_store
    }

    /// Counters accumulated by this coordinator
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Apply a transition under the default retry policy
    ///
    /// See [`Coordinator::apply_transition_with_policy`].
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::apply_transition_with_policy`].
    pub fn apply_transition<F>(
        &self,
        entity: &EntityRef,
        correlation_id: CorrelationId,
        transition: F,
    ) -> Result<TransitionResult>
    where
        F: Fn(&StateFields, &JsonMap) -> Result<TransitionOutput>,
    {
        self.apply_transition_with_policy(entity, correlation_id, self.retry_policy.clone(), transition)
    }

    /// Apply a transition with an explicit retry policy
    ///
    /// `transition` receives the entity's scalar state and JSON blob as
    /// read under the lease, and proposes new state plus a JSON delta. It
    /// MUST be a pure function of its inputs (no hidden I/O), because
    /// contention re-invokes it against a fresh snapshot.
    ///
    /// Conflict markers are judged against the first snapshot this call
    /// observed: when a retry reads a blob that moved since that first
    /// observation, divergent keys resolve last-writer-wins and surface in
    /// the result and the audit record.
    ///
    /// # Errors
    ///
    /// [`Error::RetriesExhausted`] after spending the attempt budget on
    /// contention; [`Error::Transition`] and other fatal errors propagate
    /// from the first attempt that hits them.
    pub fn apply_transition_with_policy<F>(
        &self,
        entity: &EntityRef,
        correlation_id: CorrelationId,
        policy: RetryPolicy,
        transition: F,
    ) -> Result<TransitionResult>
    where
        F: Fn(&StateFields, &JsonMap) -> Result<TransitionOutput>,
    {
        let call_started = Instant::now();
        let merge_policy = self.merge_policy_for(&entity.entity_type);

        // Snapshot of the first read in this call; later attempts judge
        // concurrent movement against it.
        let mut base_observation: Option<EntitySnapshot> = None;
        let mut attempts_seen = 0u32;

        let executor = RetryExecutor::new(policy);
        let outcome = executor.execute(|attempt| {
            attempts_seen = attempt;
            self.run_attempt(
                entity,
                &correlation_id,
                attempt,
                &mut base_observation,
                &merge_policy,
                &transition,
            )
        });

        match outcome {
            Ok(success) => {
                self.metrics.record_applied();
                debug!(
                    target: "ratchet::coord",
                    entity = %entity,
                    new_version = success.new_version,
                    attempts = attempts_seen,
                    "transition applied"
                );
                Ok(TransitionResult {
                    outcome: success.outcome,
                    new_version: success.new_version,
                    conflict_markers: success.conflict_markers,
                    attempts: attempts_seen,
                    total_duration_ms: call_started.elapsed().as_millis() as u64,
                })
            }
            Err(e) => {
                if matches!(e, Error::RetriesExhausted { .. }) {
                    self.metrics.record_retry_exhaustion();
                    warn!(
                        target: "ratchet::coord",
                        entity = %entity,
                        correlation_id = %correlation_id,
                        "retry budget exhausted"
                    );
                }
                Err(e)
            }
        }
    }

    /// One pass through the attempt state machine
    fn run_attempt<F>(
        &self,
        entity: &EntityRef,
        correlation_id: &CorrelationId,
        attempt: u32,
        base_observation: &mut Option<EntitySnapshot>,
        merge_policy: &MergePolicy,
        transition: &F,
    ) -> Result<AttemptSuccess>
    where
        F: Fn(&StateFields, &JsonMap) -> Result<TransitionOutput>,
    {
        let attempt_started = Instant::now();

        // LOCKING
        let guard = match self.locks.acquire_guard(&entity.lock_key()) {
            Ok(guard) => guard,
            Err(e) => {
                let lock_wait_ms = attempt_started.elapsed().as_millis() as u64;
                self.metrics.record_lock_wait(lock_wait_ms);
                match &e {
                    Error::LockTimeout { .. } => self.metrics.record_lock_timeout(),
                    _ => self.metrics.record_fatal_error(),
                }
                self.recorder.record(self.build_record(
                    entity,
                    correlation_id,
                    attempt,
                    None,
                    None,
                    outcome_for_error(&e),
                    Vec::new(),
                    lock_wait_ms,
                    attempt_started.elapsed().as_millis() as u64,
                ));
                return Err(e);
            }
        };
        let lock_wait_ms = attempt_started.elapsed().as_millis() as u64;
        self.metrics.record_lock_wait(lock_wait_ms);

        // READING / EXECUTING / MERGING / WRITING, with the lease held
        let mut from_version = None;
        let result: Result<AttemptSuccess> = (|| {
            // READING
            let snapshot = self.versions.read(entity)?;
            from_version = Some(snapshot.version);
            let base = base_observation.get_or_insert_with(|| snapshot.clone());

            // EXECUTING: business errors are fatal here; a transition
            // function returning a contention variant is coerced so it can
            // never be retried by this layer
            let output = transition(&snapshot.state_fields, &snapshot.json_blob)
                .map_err(|e| {
                    if e.is_retryable() {
                        Error::Transition(e.to_string())
                    } else {
                        e
                    }
                })?;

            // MERGING
            if let Some(pinned) = output.delta.base_version {
                if pinned != base.version {
                    // The caller formed its delta from an observation this
                    // call never made; conflicts are judged against the
                    // first read here, which is the freshest we can do
                    debug!(
                        target: "ratchet::coord",
                        entity = %entity,
                        pinned,
                        observed = base.version,
                        "delta base version differs from first read"
                    );
                }
            }
            let merge_result = merge(
                &base.json_blob,
                &snapshot.json_blob,
                &output.delta,
                merge_policy,
            );

            // WRITING
            let new_version = self.versions.compare_and_swap(
                entity,
                snapshot.version,
                output.state_fields,
                merge_result.merged,
            )?;

            let outcome = if merge_result.conflicts.is_empty() {
                AttemptOutcome::Success
            } else {
                AttemptOutcome::MergeConflict
            };
            Ok(AttemptSuccess {
                new_version,
                conflict_markers: merge_result.conflicts,
                outcome,
            })
        })();

        // RECORDING happens before release, so records land in write order
        match &result {
            Ok(success) => {
                if !success.conflict_markers.is_empty() {
                    self.metrics
                        .record_merge_conflicts(success.conflict_markers.len() as u64);
                }
                self.recorder.record(self.build_record(
                    entity,
                    correlation_id,
                    attempt,
                    from_version,
                    Some(success.new_version),
                    success.outcome,
                    success.conflict_markers.clone(),
                    lock_wait_ms,
                    attempt_started.elapsed().as_millis() as u64,
                ));
            }
            Err(e) => {
                match e {
                    Error::VersionConflict { .. } => self.metrics.record_version_conflict(),
                    _ => self.metrics.record_fatal_error(),
                }
                self.recorder.record(self.build_record(
                    entity,
                    correlation_id,
                    attempt,
                    from_version,
                    None,
                    outcome_for_error(e),
                    Vec::new(),
                    lock_wait_ms,
                    attempt_started.elapsed().as_millis() as u64,
                ));
            }
        }

        if let Err(e) = guard.release() {
            warn!(
                target: "ratchet::coord",
                entity = %entity,
                error = %e,
                "lease release failed after attempt"
            );
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        entity: &EntityRef,
        correlation_id: &CorrelationId,
        attempt: u32,
        from_version: Option<u64>,
        to_version: Option<u64>,
        outcome: AttemptOutcome,
        conflict_markers: Vec<ConflictMarker>,
        lock_wait_ms: u64,
        total_duration_ms: u64,
    ) -> AuditRecord {
        AuditRecord {
            correlation_id: correlation_id.clone(),
            entity_type: entity.entity_type.clone(),
            entity_id: entity.entity_id.clone(),
            attempt_number: attempt,
            from_version,
            to_version,
            outcome,
            conflict_markers,
            lock_wait_ms,
            total_duration_ms,
            timestamp: Utc::now(),
        }
    }

    fn merge_policy_for(&self, entity_type: &str) -> MergePolicy {
        self.merge_policies
            .read()
            .get(entity_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Map an attempt error to its audit outcome
fn outcome_for_error(e: &Error) -> AttemptOutcome {
    match e {
        Error::LockTimeout { .. } => AttemptOutcome::LockTimeout,
        Error::VersionConflict { .. } => AttemptOutcome::VersionConflict,
        _ => AttemptOutcome::FatalError,
    }
}
