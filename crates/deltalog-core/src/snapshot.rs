//! Snapshot store contract
//!
//! Snapshots are a replaceable cache of reconstructed entity values. Two
//! slots exist per entity: the most-recent slot, which is overwritten, and
//! the version-indexed history slot, which is append-only.

use async_trait::async_trait;
use deltalog_core_types::EntityId;

use crate::entity::Entity;
use crate::errors::CommitError;
use crate::model::{VersionNumber, Versioned};

/// One buffered snapshot write
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotWrite<E> {
    /// Replace the entity's most-recent snapshot
    MostRecent(Versioned<E>),
    /// Record the snapshot under `(entity, version)`; an existing entry is kept
    Versioned(Versioned<E>),
}

impl<E> SnapshotWrite<E> {
    pub fn snapshot(&self) -> &Versioned<E> {
        match self {
            SnapshotWrite::MostRecent(s) | SnapshotWrite::Versioned(s) => s,
        }
    }
}

#[async_trait]
pub trait SnapshotStore<E: Entity>: Send + Sync {
    async fn get_most_recent(
        &self,
        entity_id: EntityId,
    ) -> Result<Option<Versioned<E>>, CommitError>;

    async fn get_versioned(
        &self,
        entity_id: EntityId,
        version: VersionNumber,
    ) -> Result<Option<Versioned<E>>, CommitError>;

    /// Apply a batch of writes in order
    async fn write_batch(&self, writes: Vec<SnapshotWrite<E>>) -> Result<(), CommitError>;

    /// Drop the most-recent snapshot; returns whether one existed
    async fn delete_most_recent(&self, entity_id: EntityId) -> Result<bool, CommitError>;
}
