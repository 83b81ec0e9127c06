use async_trait::async_trait;
use deltalog_core::{Entity, SnapshotStore, SnapshotWrite, VersionNumber, Versioned};
use deltalog_core_types::EntityId;
use rusqlite::{params, OptionalExtension};
use std::marker::PhantomData;

use super::SqliteHandle;
use crate::errors::{from_rusqlite, from_serde, Result};

/// Snapshot store persisting both slots in SQLite
///
/// Rows are keyed by `namespace`, so stores for different entity types can
/// share one database.
pub struct SqliteSnapshotStore<E> {
    handle: SqliteHandle,
    namespace: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for SqliteSnapshotStore<E> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            namespace: self.namespace.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> SqliteSnapshotStore<E> {
    pub fn new(handle: SqliteHandle, namespace: impl Into<String>) -> Self {
        Self {
            handle,
            namespace: namespace.into(),
            _entity: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn decode<E: Entity>(value: Option<String>) -> Result<Option<Versioned<E>>> {
    value
        .map(|json| serde_json::from_str(&json).map_err(from_serde))
        .transpose()
}

#[async_trait]
impl<E: Entity> SnapshotStore<E> for SqliteSnapshotStore<E> {
    async fn get_most_recent(&self, entity_id: EntityId) -> Result<Option<Versioned<E>>> {
        let namespace = self.namespace.clone();
        let value = self
            .handle
            .run("snapshot_get_most_recent", None, move |conn| {
                conn.query_row(
                    "SELECT value FROM snapshots_most_recent WHERE namespace = ?1 AND entity_id = ?2",
                    params![namespace, entity_id.to_string()],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(from_rusqlite)
            })
            .await?;
        decode(value)
    }

    async fn get_versioned(
        &self,
        entity_id: EntityId,
        version: VersionNumber,
    ) -> Result<Option<Versioned<E>>> {
        let namespace = self.namespace.clone();
        let value = self
            .handle
            .run("snapshot_get_versioned", None, move |conn| {
                conn.query_row(
                    "SELECT value FROM snapshots_versioned
                     WHERE namespace = ?1 AND entity_id = ?2 AND version = ?3",
                    params![namespace, entity_id.to_string(), version.get() as i64],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(from_rusqlite)
            })
            .await?;
        decode(value)
    }

    async fn write_batch(&self, writes: Vec<SnapshotWrite<E>>) -> Result<()> {
        let rows = writes
            .iter()
            .map(|write| {
                let snapshot = write.snapshot();
                let json = serde_json::to_string(snapshot).map_err(from_serde)?;
                let most_recent = matches!(write, SnapshotWrite::MostRecent(_));
                Ok((
                    most_recent,
                    snapshot.entity_id.to_string(),
                    snapshot.version.get() as i64,
                    json,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let namespace = self.namespace.clone();

        self.handle
            .run("snapshot_write_batch", None, move |conn| {
                let db = conn.transaction().map_err(from_rusqlite)?;
                for (most_recent, entity_id, version, json) in &rows {
                    let sql = if *most_recent {
                        "INSERT OR REPLACE INTO snapshots_most_recent (namespace, entity_id, version, value)
                         VALUES (?1, ?2, ?3, ?4)"
                    } else {
                        "INSERT OR IGNORE INTO snapshots_versioned (namespace, entity_id, version, value)
                         VALUES (?1, ?2, ?3, ?4)"
                    };
                    db.execute(sql, params![namespace, entity_id, version, json])
                        .map_err(from_rusqlite)?;
                }
                db.commit().map_err(from_rusqlite)
            })
            .await
    }

    async fn delete_most_recent(&self, entity_id: EntityId) -> Result<bool> {
        let namespace = self.namespace.clone();
        self.handle
            .run("snapshot_delete_most_recent", None, move |conn| {
                let removed = conn
                    .execute(
                        "DELETE FROM snapshots_most_recent WHERE namespace = ?1 AND entity_id = ?2",
                        params![namespace, entity_id.to_string()],
                    )
                    .map_err(from_rusqlite)?;
                Ok(removed > 0)
            })
            .await
    }
}
