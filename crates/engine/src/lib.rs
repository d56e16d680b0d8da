//! Coordination engine: the public entry point
//!
//! The [`Coordinator`] orchestrates one guarded mutation: lease acquisition,
//! version-checked read, the caller's pure transition function,
//! conflict-aware merge, conditional write, audit recording, and
//! retry-on-contention. Callers see a single synchronous result per call;
//! intermediate retries surface only as the aggregate attempt count.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod coordinator;
pub mod metrics;

pub use audit::AuditRecorder;
pub use coordinator::{Coordinator, TransitionOutput, TransitionResult};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
