//! Snapshot-and-replay entity reader
//!
//! Starts from the most-recent snapshot (or the constructed zero-version
//! value) and replays every later delta in version order. Snapshots only
//! shorten the replay; removing them never changes the result.

use async_trait::async_trait;
use deltalog_core::{
    log_op_error, BuilderError, Entity, EntityReader, Query, Repository, SnapshotStore,
    VersionNumber, Versioned,
};
use deltalog_core_types::EntityId;
use std::marker::PhantomData;
use std::time::Instant;

use crate::resilient::{emit_with, ResilientRepository};

pub struct SnapshotReplayReader<E, R, S> {
    repository: ResilientRepository<R>,
    snapshots: S,
    _entity: PhantomData<fn() -> E>,
}

impl<E, R, S> SnapshotReplayReader<E, R, S>
where
    E: Entity,
    R: Repository,
    S: SnapshotStore<E>,
{
    pub fn new(repository: ResilientRepository<R>, snapshots: S) -> Self {
        Self {
            repository,
            snapshots,
            _entity: PhantomData,
        }
    }

    /// Starting point for replay; a failing snapshot store falls back to full replay
    async fn base(&self, entity_id: EntityId) -> Versioned<E> {
        let start = Instant::now();
        let snapshot = match self.snapshots.get_most_recent(entity_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                emit_with(self.repository.options(), || {
                    log_op_error!(
                        "read_snapshot",
                        err,
                        duration_ms = start.elapsed().as_millis() as u64,
                        scope_id = %self.repository.scope_id(),
                        entity_id = %entity_id
                    );
                });
                None
            }
        };
        snapshot.unwrap_or_else(|| {
            Versioned::new(entity_id, VersionNumber::ZERO, E::construct(entity_id))
        })
    }
}

#[async_trait]
impl<E, R, S> EntityReader<E> for SnapshotReplayReader<E, R, S>
where
    E: Entity,
    R: Repository,
    S: SnapshotStore<E>,
{
    async fn get(&self, entity_id: EntityId) -> Result<Versioned<E>, BuilderError> {
        let mut current = self.base(entity_id).await;
        let query = Query::entity_versions(entity_id, Some(current.version.next()), None);

        let mut replayed = 0usize;
        for annotated in self.repository.enumerate_annotated_deltas(&query).await {
            if let Some(payload) = &annotated.delta {
                if payload.type_name != E::DELTA_TYPE {
                    return Err(BuilderError::Serialization {
                        message: format!(
                            "entity {} has a {} delta at version {}, expected {}",
                            entity_id, payload.type_name, annotated.version, E::DELTA_TYPE
                        ),
                    });
                }
                let delta: E::Delta =
                    payload
                        .decode()
                        .map_err(|e| BuilderError::Serialization {
                            message: e.to_string(),
                        })?;
                current.value = current.value.reduce(&delta);
                replayed += 1;
            }
            current.version = annotated.version;
        }

        tracing::debug!(
            entity_id = %entity_id,
            version = %current.version,
            replayed,
            "entity read"
        );
        Ok(current)
    }
}
