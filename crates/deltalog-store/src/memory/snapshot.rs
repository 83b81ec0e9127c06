use async_trait::async_trait;
use deltalog_core::{Entity, SnapshotStore, SnapshotWrite, VersionNumber, Versioned};
use deltalog_core_types::EntityId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::errors::{lock_poisoned, Result};

struct Slots<E> {
    most_recent: HashMap<EntityId, Versioned<E>>,
    versioned: BTreeMap<(EntityId, VersionNumber), Versioned<E>>,
}

/// Snapshot store keeping both slots in memory
///
/// Clones share the same state.
pub struct MemorySnapshotStore<E> {
    slots: Arc<Mutex<Slots<E>>>,
}

impl<E> Clone for MemorySnapshotStore<E> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<E> Default for MemorySnapshotStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> MemorySnapshotStore<E> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                most_recent: HashMap::new(),
                versioned: BTreeMap::new(),
            })),
        }
    }

    /// Number of entries in the version-indexed slot
    pub fn versioned_len(&self) -> usize {
        self.slots.lock().map(|s| s.versioned.len()).unwrap_or(0)
    }
}

#[async_trait]
impl<E: Entity> SnapshotStore<E> for MemorySnapshotStore<E> {
    async fn get_most_recent(&self, entity_id: EntityId) -> Result<Option<Versioned<E>>> {
        let slots = self.slots.lock().map_err(|_| lock_poisoned())?;
        Ok(slots.most_recent.get(&entity_id).cloned())
    }

    async fn get_versioned(
        &self,
        entity_id: EntityId,
        version: VersionNumber,
    ) -> Result<Option<Versioned<E>>> {
        let slots = self.slots.lock().map_err(|_| lock_poisoned())?;
        Ok(slots.versioned.get(&(entity_id, version)).cloned())
    }

    async fn write_batch(&self, writes: Vec<SnapshotWrite<E>>) -> Result<()> {
        let mut slots = self.slots.lock().map_err(|_| lock_poisoned())?;
        for write in writes {
            match write {
                SnapshotWrite::MostRecent(snapshot) => {
                    slots.most_recent.insert(snapshot.entity_id, snapshot);
                }
                SnapshotWrite::Versioned(snapshot) => {
                    slots
                        .versioned
                        .entry((snapshot.entity_id, snapshot.version))
                        .or_insert(snapshot);
                }
            }
        }
        Ok(())
    }

    async fn delete_most_recent(&self, entity_id: EntityId) -> Result<bool> {
        let mut slots = self.slots.lock().map_err(|_| lock_poisoned())?;
        Ok(slots.most_recent.remove(&entity_id).is_some())
    }
}
