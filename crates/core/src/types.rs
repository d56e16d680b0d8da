//! Entity identity and snapshot types
//!
//! This module defines the foundational types:
//! - EntityRef: typed identity of a coordinated record
//! - HolderToken: per-acquisition lease ownership token
//! - CorrelationId: cross-system tracing identifier
//! - EntitySnapshot: one versioned read of a record
//! - JsonDelta: a caller's proposed partial update

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Structured extensible data attached to an entity, keyed by top-level field
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Scalar attributes of an entity (status enums, assignees, priorities)
///
/// Kept separate from the JSON blob: state fields are replaced wholesale on
/// write, the blob goes through conflict-aware merge.
pub type StateFields = BTreeMap<String, serde_json::Value>;

/// Identity of a coordinated record
///
/// An EntityRef names one row in durable storage: a type discriminator
/// ("ticket", "job", "asset") plus an opaque identifier. It is also the
/// unit of mutual exclusion: the lock key is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Type discriminator, e.g. "ticket" or "job"
    pub entity_type: String,
    /// Opaque identifier within the type
    pub entity_id: String,
}

impl EntityRef {
    /// Create a new entity reference
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Deterministic lock key for this entity
    ///
    /// Every process derives the same key for the same entity, so the
    /// coordination store serializes writers regardless of where they run.
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.entity_type, self.entity_id)
    }
}

// Display matches the lock key so log lines and store keys read the same.
impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Random per-acquisition lease ownership token
///
/// A fresh token is generated for every acquire attempt. Release and renew
/// present the token back to the coordination store, which only honors the
/// request if the stored value still matches, so a holder whose lease expired
/// and was re-acquired by another process cannot release the new lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderToken(Uuid);

impl HolderToken {
    /// Generate a fresh random token (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a token from its string representation
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cross-system tracing identifier carried on every audit record
///
/// Interactive callers pass through their request id; background workers
/// without one call [`CorrelationId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an externally supplied correlation id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh correlation id (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One versioned read of an entity
///
/// The version is monotonically increasing, incremented exactly once per
/// successful write. A write presenting a stale version is rejected by the
/// durable store's conditional update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Scalar attributes (status, assignee, ...)
    pub state_fields: StateFields,
    /// Structured extensible data, merged field-by-field on write
    pub json_blob: JsonMap,
    /// Version observed at read time
    pub version: u64,
}

impl EntitySnapshot {
    /// Create a snapshot at version 1 (a freshly created entity)
    pub fn initial(state_fields: StateFields, json_blob: JsonMap) -> Self {
        Self {
            state_fields,
            json_blob,
            version: 1,
        }
    }
}

/// A caller's proposed partial update to an entity's JSON blob
///
/// Maps top-level keys to new values. `base_version` records the version the
/// caller observed when it formed the delta; when absent, the coordinator
/// treats the version it read for this attempt as the base. A delta lives
/// only for the duration of one transition call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDelta {
    /// Proposed top-level key updates
    pub changes: JsonMap,
    /// Version the caller observed when forming the delta
    pub base_version: Option<u64>,
}

impl JsonDelta {
    /// Create an empty delta
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one top-level key
    pub fn set(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.changes.insert(key.into(), value);
        self
    }

    /// Pin the delta to the version the caller observed
    pub fn with_base_version(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }

    /// True if the delta proposes no changes
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
