//! External-store contracts
//!
//! This module defines the traits that decouple the coordination layer from
//! any particular backing store, so a Redis-style coordination store or a
//! SQL durable store can be swapped in without breaking upper layers.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use crate::error::Result;
use crate::record::{AttemptOutcome, AuditRecord};
use crate::types::{EntityRef, EntitySnapshot, HolderToken, JsonMap, StateFields};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Coordination-store contract: three atomic primitives
///
/// Any store offering atomic set-if-absent-with-expiry, compare-and-delete,
/// and compare-and-expire satisfies this contract: a single-threaded
/// key-value server with scripting, or a consensus-backed store. Each method
/// must execute as one atomic operation against the store; implementing any
/// of them as separate read-then-write calls breaks lease safety.
pub trait LeaseStore: Send + Sync {
    /// Store `token` under `key` with expiry `ttl`, only if `key` is absent
    ///
    /// Returns true if the key was set (lease granted), false if a live
    /// lease already exists. An expired entry counts as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordination store is unreachable.
    fn put_if_absent(&self, key: &str, token: HolderToken, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if its stored value equals `token`
    ///
    /// Returns true if the key was deleted, false if it was absent or held
    /// by a different token.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordination store is unreachable.
    fn delete_if_match(&self, key: &str, token: HolderToken) -> Result<bool>;

    /// Reset `key`'s expiry to `ttl` only if its stored value equals `token`
    ///
    /// Returns true if the expiry was extended, false if the key was absent
    /// or held by a different token.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordination store is unreachable.
    fn expire_if_match(&self, key: &str, token: HolderToken, ttl: Duration) -> Result<bool>;
}

/// Durable-storage contract for coordinated entities
///
/// The store owns the canonical copy; the coordination layer only reads and
/// conditionally writes it. `cas_write` must be a single atomic conditional
/// update (e.g. a row update with a version predicate checked via
/// affected-row count), never separate read-then-write calls.
pub trait EntityStore: Send + Sync {
    /// Read the current state, blob, and version of an entity
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::EntityNotFound`] if the entity does not
    /// exist, or [`crate::Error::StorageUnavailable`] on store failure.
    fn read(&self, entity: &EntityRef) -> Result<EntitySnapshot>;

    /// Conditionally write new state, advancing the version by one
    ///
    /// Succeeds and returns `expected_version + 1` only if the stored
    /// version still equals `expected_version` at write time.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::VersionConflict`] if another writer advanced
    /// the version first, or [`crate::Error::StorageUnavailable`] on store
    /// failure.
    fn cas_write(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        state_fields: StateFields,
        json_blob: JsonMap,
    ) -> Result<u64>;
}

/// Append-only audit sink with the three query shapes reporting needs
pub trait AuditStore: Send + Sync {
    /// Append one record; records are never updated or deleted
    ///
    /// # Errors
    ///
    /// Returns an error if the audit store is unreachable. Callers above
    /// the recorder must not let this failure block business progress.
    fn append(&self, record: AuditRecord) -> Result<()>;

    /// Full attempt history for one entity, in append order
    ///
    /// # Errors
    ///
    /// Returns an error if the audit store is unreachable.
    fn for_entity(&self, entity: &EntityRef) -> Result<Vec<AuditRecord>>;

    /// All records with `outcome` in the half-open window `[from, until)`
    ///
    /// # Errors
    ///
    /// Returns an error if the audit store is unreachable.
    fn by_outcome(
        &self,
        outcome: AttemptOutcome,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>>;

    /// All records carrying `correlation_id`, across entities
    ///
    /// # Errors
    ///
    /// Returns an error if the audit store is unreachable.
    fn by_correlation(&self, correlation_id: &str) -> Result<Vec<AuditRecord>>;
}
