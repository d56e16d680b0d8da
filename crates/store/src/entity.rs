//! In-memory durable entity store
//!
//! Rows live in a sharded map; the conditional write happens entirely under
//! the row's shard lock, making it one atomic statement, the same
//! guarantee a SQL `UPDATE ... WHERE version = ?` checked via affected-row
//! count provides.

use dashmap::DashMap;
use ratchet_core::{
    EntityRef, EntitySnapshot, EntityStore, Error, JsonMap, Result, StateFields,
};

#[derive(Debug, Clone)]
struct StoredEntity {
    state_fields: StateFields,
    json_blob: JsonMap,
    version: u64,
}

/// Process-local [`EntityStore`] backed by a sharded map
#[derive(Default)]
pub struct MemoryEntityStore {
    rows: DashMap<EntityRef, StoredEntity>,
}

impl MemoryEntityStore {
    /// Create an empty entity store
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an entity at version 1, replacing any existing row
    ///
    /// Fixture helper: entity creation is owned by the surrounding system,
    /// not the coordination layer.
    pub fn seed(&self, entity: EntityRef, state_fields: StateFields, json_blob: JsonMap) {
        self.rows.insert(
            entity,
            StoredEntity {
                state_fields,
                json_blob,
                version: 1,
            },
        );
    }

    /// Number of stored entities
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no entities are stored
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl EntityStore for MemoryEntityStore {
    fn read(&self, entity: &EntityRef) -> Result<EntitySnapshot> {
        match self.rows.get(entity) {
            Some(row) => Ok(EntitySnapshot {
                state_fields: row.state_fields.clone(),
                json_blob: row.json_blob.clone(),
                version: row.version,
            }),
            None => Err(Error::EntityNotFound(entity.lock_key())),
        }
    }

    fn cas_write(
        &self,
        entity: &EntityRef,
        expected_version: u64,
        state_fields: StateFields,
        json_blob: JsonMap,
    ) -> Result<u64> {
        // get_mut holds the shard lock for the whole check-and-update
        let mut row = self
            .rows
            .get_mut(entity)
            .ok_or_else(|| Error::EntityNotFound(entity.lock_key()))?;

        if row.version != expected_version {
            return Err(Error::VersionConflict {
                expected: expected_version,
                actual: row.version,
            });
        }

        row.state_fields = state_fields;
        row.json_blob = json_blob;
        row.version += 1;
        Ok(row.version)
    }
}
