//! Coordination layer: leases, version guard, merge, retry
//!
//! This crate implements the mechanics that keep concurrent writers safe:
//! - `lease`: distributed mutual-exclusion leases over a [`ratchet_core::LeaseStore`]
//! - `version`: optimistic version checking over an [`ratchet_core::EntityStore`]
//! - `merge`: conflict-aware merge of partial JSON updates
//! - `retry`: bounded retry with capped exponential backoff and jitter
//!
//! The lock and the version check protect against different things. The
//! lock stops two callers from racing to compute a new state; the version
//! check rejects any writer that bypassed the lock. Both are required:
//! the lock reduces wasted work under contention, the version check is the
//! correctness guarantee.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lease;
pub mod merge;
pub mod retry;
pub mod version;

pub use lease::{LeaseConfig, LeaseGuard, LockLease, LockManager};
pub use merge::{merge, FieldSemantics, MergePolicy, MergeResult, COUNTERS_KEY};
pub use retry::{RetryExecutor, RetryPolicy};
pub use version::VersionGuard;
