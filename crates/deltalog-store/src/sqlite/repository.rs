use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deltalog_core::commit::{check_batch, validate_steps};
use deltalog_core::{
    AgentSignature, AnnotatedDelta, CommitError, Lease, Payload, Query, RecordKind, Repository,
    SessionOptions, Tag, Transaction, VersionNumber,
};
use deltalog_core_types::{EntityId, TransactionId};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::str::FromStr;

use super::builders::{SqlFilterBuilder, SqlSortBuilder};
use super::SqliteHandle;
use crate::errors::{classify_insert, corrupt_column, from_rusqlite, from_serde, Result};
use crate::record::{self, Record, RecordBody};

/// Repository persisting record streams in SQLite
#[derive(Clone)]
pub struct SqliteRepository {
    handle: SqliteHandle,
    options: SessionOptions,
}

impl SqliteRepository {
    pub fn new(handle: SqliteHandle, options: SessionOptions) -> Self {
        Self { handle, options }
    }

    pub fn handle(&self) -> &SqliteHandle {
        &self.handle
    }

    async fn scan(&self, query: &Query) -> Result<Vec<Record>> {
        let kind = query.record_kind();
        let filter = query.filter(&SqlFilterBuilder::new(kind));
        let order = query.sort(&SqlSortBuilder::new(kind));

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            columns(kind),
            table(kind),
            filter.sql
        );
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        let mut params = filter.params;
        if query.skip().is_some() || query.take().is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
            // Negative LIMIT means unbounded; oversized values saturate.
            let limit = query
                .take()
                .map_or(-1, |t| i64::try_from(t).unwrap_or(i64::MAX));
            let offset = i64::try_from(query.skip().unwrap_or(0)).unwrap_or(i64::MAX);
            params.push(rusqlite::types::Value::Integer(limit));
            params.push(rusqlite::types::Value::Integer(offset));
        }

        self.handle
            .run("scan", self.options.read_timeout, move |conn| {
                let records = select_records(conn, kind, &sql, params)?;
                tracing::debug!(%kind, result_count = records.len(), "sqlite scan");
                Ok(records)
            })
            .await
    }
}

fn table(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Transaction => "transactions",
        RecordKind::Delta => "deltas",
        RecordKind::Lease => "leases",
        RecordKind::Tag => "tags",
    }
}

fn columns(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Transaction => "seq, id, timestamp_ms, agent",
        RecordKind::Delta => {
            "seq, transaction_id, timestamp_ms, entity_id, version, delta_type, delta"
        }
        RecordKind::Lease => {
            "seq, transaction_id, timestamp_ms, entity_id, version, scope, label, value"
        }
        RecordKind::Tag => "seq, transaction_id, timestamp_ms, entity_id, version, label, value",
    }
}

/// Raw column values of one row, decoded after the statement finishes
struct RawRow {
    seq: i64,
    transaction_id: String,
    timestamp_ms: i64,
    text: Vec<Option<String>>,
    version: i64,
}

fn read_raw(row: &Row<'_>, kind: RecordKind) -> rusqlite::Result<RawRow> {
    let (version, text) = match kind {
        RecordKind::Transaction => (0, vec![row.get(3)?]),
        RecordKind::Delta => (row.get(4)?, vec![row.get(3)?, row.get(5)?, row.get(6)?]),
        RecordKind::Lease => (
            row.get(4)?,
            vec![row.get(3)?, row.get(5)?, row.get(6)?, row.get(7)?],
        ),
        RecordKind::Tag => (row.get(4)?, vec![row.get(3)?, row.get(5)?, row.get(6)?]),
    };
    Ok(RawRow {
        seq: row.get(0)?,
        transaction_id: row.get(1)?,
        timestamp_ms: row.get(2)?,
        text,
        version,
    })
}

fn parse_id<T: FromStr>(column: &str, value: &str) -> Result<T> {
    T::from_str(value).map_err(|_| corrupt_column(column, value))
}

fn parse_timestamp(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| corrupt_column("timestamp_ms", &ms.to_string()))
}

fn required(text: &mut [Option<String>], index: usize, column: &str) -> Result<String> {
    text.get_mut(index)
        .and_then(Option::take)
        .ok_or_else(|| corrupt_column(column, "NULL"))
}

fn select_records(
    conn: &Connection,
    kind: RecordKind,
    sql: &str,
    params: Vec<rusqlite::types::Value>,
) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
    let raw: Vec<RawRow> = stmt
        .query_map(params_from_iter(params.iter()), |row| read_raw(row, kind))
        .map_err(from_rusqlite)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(from_rusqlite)?;
    drop(stmt);

    raw.into_iter().map(|r| decode(conn, kind, r)).collect()
}

fn decode(conn: &Connection, kind: RecordKind, mut raw: RawRow) -> Result<Record> {
    let transaction_id: TransactionId = parse_id("transaction_id", &raw.transaction_id)?;
    let version = VersionNumber(raw.version as u64);

    let body = match kind {
        RecordKind::Transaction => {
            let agent_json = required(&mut raw.text, 0, "agent")?;
            RecordBody::Transaction {
                agent: serde_json::from_str(&agent_json).map_err(from_serde)?,
                entity_ids: touched_entities(conn, &raw.transaction_id)?,
            }
        }
        RecordKind::Delta => {
            let entity_id = parse_id("entity_id", &required(&mut raw.text, 0, "entity_id")?)?;
            let delta = match (raw.text[1].take(), raw.text[2].take()) {
                (Some(type_name), Some(data)) => Some(Payload {
                    type_name,
                    data: serde_json::from_str(&data).map_err(from_serde)?,
                }),
                _ => None,
            };
            RecordBody::Delta {
                entity_id,
                version,
                delta,
            }
        }
        RecordKind::Lease => RecordBody::Lease {
            entity_id: parse_id("entity_id", &required(&mut raw.text, 0, "entity_id")?)?,
            version,
            lease: Lease {
                scope: required(&mut raw.text, 1, "scope")?,
                label: required(&mut raw.text, 2, "label")?,
                value: required(&mut raw.text, 3, "value")?,
            },
        },
        RecordKind::Tag => RecordBody::Tag {
            entity_id: parse_id("entity_id", &required(&mut raw.text, 0, "entity_id")?)?,
            version,
            tag: Tag {
                label: required(&mut raw.text, 1, "label")?,
                value: required(&mut raw.text, 2, "value")?,
            },
        },
    };

    Ok(Record {
        sequence: raw.seq as u64,
        transaction_id,
        timestamp: parse_timestamp(raw.timestamp_ms)?,
        body,
    })
}

fn touched_entities(conn: &Connection, transaction_id: &str) -> Result<Vec<EntityId>> {
    let mut stmt = conn
        .prepare("SELECT entity_id FROM deltas WHERE transaction_id = ?1 ORDER BY seq")
        .map_err(from_rusqlite)?;
    let ids: Vec<String> = stmt
        .query_map([transaction_id], |row| row.get(0))
        .map_err(from_rusqlite)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(from_rusqlite)?;

    let mut entity_ids: Vec<EntityId> = Vec::new();
    for id in ids {
        let entity_id = parse_id("entity_id", &id)?;
        if !entity_ids.contains(&entity_id) {
            entity_ids.push(entity_id);
        }
    }
    Ok(entity_ids)
}

/// Write every row of a validated transaction in one SQLite transaction
///
/// Any unique violation here is against previously committed rows, since
/// in-batch duplicates were rejected before the write.
fn write_transaction(conn: &mut Connection, transaction: &Transaction) -> Result<()> {
    let db = conn.transaction().map_err(from_rusqlite)?;
    let transaction_id = transaction.id.to_string();
    let timestamp_ms = transaction.timestamp.timestamp_millis();
    let agent = serde_json::to_string(&transaction.agent).map_err(from_serde)?;

    db.execute(
        "INSERT INTO transactions (id, timestamp_ms, agent_id, agent) VALUES (?1, ?2, ?3, ?4)",
        params![transaction_id, timestamp_ms, transaction.agent.agent_id, agent],
    )
    .map_err(|e| {
        classify_insert(e, || CommitError::DuplicateTransaction {
            transaction_id: transaction.id,
        })
    })?;

    for step in &transaction.steps {
        let entity_id = step.entity_id.to_string();
        let version = step.next_version.get() as i64;
        let (delta_type, delta) = match &step.delta {
            Some(payload) => (
                Some(payload.type_name.as_str()),
                Some(serde_json::to_string(&payload.data).map_err(from_serde)?),
            ),
            None => (None, None),
        };

        db.execute(
            "INSERT INTO deltas (transaction_id, timestamp_ms, entity_id, version, delta_type, delta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![transaction_id, timestamp_ms, entity_id, version, delta_type, delta],
        )
        .map_err(|e| {
            classify_insert(e, || CommitError::OptimisticConcurrency {
                reason: format!(
                    "entity {} already has version {}",
                    step.entity_id, step.next_version
                ),
            })
        })?;

        for lease in &step.leases.delete {
            db.execute(
                "DELETE FROM leases WHERE entity_id = ?1 AND scope = ?2 AND label = ?3 AND value = ?4",
                params![entity_id, lease.scope, lease.label, lease.value],
            )
            .map_err(from_rusqlite)?;
        }
        for lease in &step.leases.insert {
            db.execute(
                "INSERT INTO leases (transaction_id, timestamp_ms, entity_id, version, scope, label, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    transaction_id,
                    timestamp_ms,
                    entity_id,
                    version,
                    lease.scope,
                    lease.label,
                    lease.value
                ],
            )
            .map_err(|e| {
                classify_insert(e, || CommitError::OptimisticConcurrency {
                    reason: format!(
                        "lease ({}, {}, {}) is already held",
                        lease.scope, lease.label, lease.value
                    ),
                })
            })?;
        }

        for tag in &step.tags.delete {
            db.execute(
                "DELETE FROM tags WHERE entity_id = ?1 AND label = ?2 AND value = ?3",
                params![entity_id, tag.label, tag.value],
            )
            .map_err(from_rusqlite)?;
        }
        for tag in &step.tags.insert {
            db.execute(
                "INSERT INTO tags (transaction_id, timestamp_ms, entity_id, version, label, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![transaction_id, timestamp_ms, entity_id, version, tag.label, tag.value],
            )
            .map_err(from_rusqlite)?;
        }
    }

    db.commit().map_err(from_rusqlite)
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn enumerate_transaction_ids(&self, query: &Query) -> Result<Vec<TransactionId>> {
        Ok(record::transaction_ids(self.scan(query).await?))
    }

    async fn enumerate_entity_ids(&self, query: &Query) -> Result<Vec<EntityId>> {
        Ok(record::entity_ids(self.scan(query).await?))
    }

    async fn enumerate_agent_signatures(&self, query: &Query) -> Result<Vec<AgentSignature>> {
        record::agent_signatures(query, self.scan(query).await?)
    }

    async fn enumerate_deltas(&self, query: &Query) -> Result<Vec<Payload>> {
        record::deltas(query, self.scan(query).await?)
    }

    async fn enumerate_leases(&self, query: &Query) -> Result<Vec<Lease>> {
        record::leases(query, self.scan(query).await?)
    }

    async fn enumerate_tags(&self, query: &Query) -> Result<Vec<Tag>> {
        record::tags(query, self.scan(query).await?)
    }

    async fn enumerate_annotated_deltas(&self, query: &Query) -> Result<Vec<AnnotatedDelta>> {
        record::annotated_deltas(query, self.scan(query).await?)
    }

    async fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        if self.options.read_only {
            return Err(CommitError::CannotWriteInReadOnlyMode);
        }
        validate_steps(transaction)?;
        check_batch(transaction)?;

        let owned = transaction.clone();
        self.handle
            .run("put_transaction", None, move |conn| {
                write_transaction(conn, &owned)?;
                tracing::debug!(
                    transaction_id = %owned.id,
                    step_count = owned.steps.len(),
                    "transaction stored in sqlite"
                );
                Ok(())
            })
            .await
    }
}
