//! Core types for the ratchet coordination layer
//!
//! This crate defines the foundational vocabulary shared by every layer:
//! - Entity identity and snapshots (`types`)
//! - The error taxonomy with retryable/fatal classification (`error`)
//! - Audit records and conflict markers (`record`)
//! - The external-store contracts (`traits`)
//!
//! Nothing in this crate performs I/O. The coordination store and durable
//! store are external collaborators reached through the traits defined here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorClass, Result};
pub use record::{AttemptOutcome, AuditRecord, ConflictMarker, ConflictResolution};
pub use traits::{AuditStore, EntityStore, LeaseStore};
pub use types::{
    CorrelationId, EntityRef, EntitySnapshot, HolderToken, JsonDelta, JsonMap, StateFields,
};
