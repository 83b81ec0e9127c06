//! Snapshot subscription pipeline
//!
//! For each committed transaction, steps are grouped by entity in step
//! order and the last step's resulting value becomes that entity's
//! candidate snapshot. The entity's policies then decide:
//!
//! | Policy                        | `true`                          | `false`           |
//! |-------------------------------|---------------------------------|-------------------|
//! | `should_record_as_most_recent`| written to the most-recent slot | cached for the run|
//! | `should_record`               | written to the versioned slot   | skipped           |
//!
//! All writes of one run are flushed as a single batch.
//!
//! Resulting values only exist on transactions built in this process (the
//! step state is never persisted), and a pipeline only sees steps whose
//! state is its own entity type.

use async_trait::async_trait;
use deltalog_core::{
    CommitError, Entity, SnapshotStore, SnapshotWrite, Transaction, VersionNumber, Versioned,
};
use deltalog_core_types::EntityId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::subscribers::TransactionSubscriber;

/// What one pipeline run did with each candidate snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Entities whose candidate replaced the most-recent slot
    pub recorded_most_recent: Vec<EntityId>,
    /// Candidates added to the version-indexed slot
    pub recorded_versioned: Vec<(EntityId, VersionNumber)>,
    /// Entities whose candidate was rejected for the most-recent slot
    pub cached: Vec<EntityId>,
}

impl SnapshotReport {
    pub fn is_empty(&self) -> bool {
        self.recorded_most_recent.is_empty()
            && self.recorded_versioned.is_empty()
            && self.cached.is_empty()
    }
}

pub struct SnapshotPipeline<E, S> {
    store: S,
    name: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: SnapshotStore<E>> SnapshotPipeline<E, S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            name: format!("snapshot_pipeline:{}", E::DELTA_TYPE),
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Derive and persist snapshots for one committed transaction
    ///
    /// # Errors
    ///
    /// Returns the snapshot store's error if reading a previous snapshot or
    /// flushing the batch fails. Nothing is written in that case.
    pub async fn run(&self, transaction: &Transaction) -> Result<SnapshotReport, CommitError> {
        let mut report = SnapshotReport::default();
        let mut writes = Vec::new();
        let mut cache: HashMap<EntityId, Versioned<E>> = HashMap::new();

        for candidate in last_states::<E>(transaction) {
            let entity_id = candidate.entity_id;
            let previous = self.store.get_most_recent(entity_id).await?;

            if E::should_record(&candidate) {
                report
                    .recorded_versioned
                    .push((entity_id, candidate.version));
                writes.push(SnapshotWrite::Versioned(candidate.clone()));
            }

            if E::should_record_as_most_recent(&candidate, previous.as_ref()) {
                report.recorded_most_recent.push(entity_id);
                writes.push(SnapshotWrite::MostRecent(candidate));
            } else {
                report.cached.push(entity_id);
                cache.insert(entity_id, candidate);
            }
        }

        if !writes.is_empty() {
            self.store.write_batch(writes).await?;
        }

        tracing::debug!(
            transaction_id = %transaction.id,
            most_recent = report.recorded_most_recent.len(),
            versioned = report.recorded_versioned.len(),
            cached = cache.len(),
            "snapshot run finished"
        );
        Ok(report)
    }
}

/// The last resulting state per entity, in order of first appearance
fn last_states<E: Entity>(transaction: &Transaction) -> Vec<Versioned<E>> {
    let mut order: Vec<EntityId> = Vec::new();
    let mut last: HashMap<EntityId, &Versioned<E>> = HashMap::new();

    for step in &transaction.steps {
        let Some(state) = step.state_as::<E>() else {
            continue;
        };
        if last.insert(step.entity_id, state).is_none() {
            order.push(step.entity_id);
        }
    }

    order
        .into_iter()
        .filter_map(|id| last.get(&id).map(|state| (*state).clone()))
        .collect()
}

#[async_trait]
impl<E, S> TransactionSubscriber for SnapshotPipeline<E, S>
where
    E: Entity,
    S: SnapshotStore<E>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, transaction: Arc<Transaction>) -> Result<(), CommitError> {
        self.run(&transaction).await.map(|_| ())
    }
}
