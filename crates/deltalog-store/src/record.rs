//! Backend-neutral record rows and query projections
//!
//! Both backends scan a stream into [`Record`] values (already filtered,
//! sorted and paginated) and then share the projections below, so every
//! repository operation behaves identically on every backend.

use chrono::{DateTime, Utc};
use deltalog_core::query::{Predicate, SortKey};
use deltalog_core::repository::require_kind;
use deltalog_core::{
    AgentSignature, AnnotatedDelta, Lease, Payload, Query, RecordKind, Tag, VersionNumber,
};
use deltalog_core_types::{EntityId, TransactionId};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use crate::errors::Result;

/// One row of a record stream
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Commit order within the stream
    pub sequence: u64,
    pub transaction_id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub body: RecordBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    Transaction {
        agent: AgentSignature,
        /// Entities touched by the transaction, in step order
        entity_ids: Vec<EntityId>,
    },
    Delta {
        entity_id: EntityId,
        version: VersionNumber,
        delta: Option<Payload>,
    },
    Lease {
        entity_id: EntityId,
        version: VersionNumber,
        lease: Lease,
    },
    Tag {
        entity_id: EntityId,
        version: VersionNumber,
        tag: Tag,
    },
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self.body {
            RecordBody::Transaction { .. } => RecordKind::Transaction,
            RecordBody::Delta { .. } => RecordKind::Delta,
            RecordBody::Lease { .. } => RecordKind::Lease,
            RecordBody::Tag { .. } => RecordKind::Tag,
        }
    }

    /// The entity a step-derived record belongs to
    pub fn entity_id(&self) -> Option<EntityId> {
        match &self.body {
            RecordBody::Transaction { .. } => None,
            RecordBody::Delta { entity_id, .. }
            | RecordBody::Lease { entity_id, .. }
            | RecordBody::Tag { entity_id, .. } => Some(*entity_id),
        }
    }

    pub fn version(&self) -> Option<VersionNumber> {
        match &self.body {
            RecordBody::Transaction { .. } => None,
            RecordBody::Delta { version, .. }
            | RecordBody::Lease { version, .. }
            | RecordBody::Tag { version, .. } => Some(*version),
        }
    }

    fn lease(&self) -> Option<&Lease> {
        match &self.body {
            RecordBody::Lease { lease, .. } => Some(lease),
            _ => None,
        }
    }

    fn tag(&self) -> Option<&Tag> {
        match &self.body {
            RecordBody::Tag { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Evaluate one predicate; a field this record lacks never matches
    pub fn matches(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::TransactionIdIn(ids) => ids.contains(&self.transaction_id),
            Predicate::TimestampGte(t) => self.timestamp >= *t,
            Predicate::TimestampLte(t) => self.timestamp <= *t,
            Predicate::AgentIdEq(agent_id) => match &self.body {
                RecordBody::Transaction { agent, .. } => agent.agent_id == *agent_id,
                _ => false,
            },
            Predicate::EntityIdIn(ids) => match &self.body {
                RecordBody::Transaction { entity_ids, .. } => {
                    entity_ids.iter().any(|id| ids.contains(id))
                }
                _ => self.entity_id().is_some_and(|id| ids.contains(&id)),
            },
            Predicate::VersionGte(v) => self.version().is_some_and(|version| version >= *v),
            Predicate::VersionLte(v) => self.version().is_some_and(|version| version <= *v),
            Predicate::DeltaTypeEq(type_name) => match &self.body {
                RecordBody::Delta {
                    delta: Some(payload),
                    ..
                } => payload.type_name == *type_name,
                _ => false,
            },
            Predicate::LeaseScopeEq(s) => self.lease().is_some_and(|l| l.scope == *s),
            Predicate::LeaseLabelEq(s) => self.lease().is_some_and(|l| l.label == *s),
            Predicate::LeaseValueEq(s) => self.lease().is_some_and(|l| l.value == *s),
            Predicate::TagLabelEq(s) => self.tag().is_some_and(|t| t.label == *s),
            Predicate::TagValueEq(s) => self.tag().is_some_and(|t| t.value == *s),
        }
    }

    /// Compare two records of the same stream by one key
    ///
    /// Keys a record lacks compare equal, leaving the decision to later keys.
    pub fn compare(&self, other: &Record, key: SortKey) -> Ordering {
        match key {
            SortKey::Timestamp => self.timestamp.cmp(&other.timestamp),
            SortKey::TransactionId => self.transaction_id.cmp(&other.transaction_id),
            SortKey::EntityId => self.entity_id().cmp(&other.entity_id()),
            SortKey::EntityVersion => self.version().cmp(&other.version()),
            SortKey::LeaseScope => self
                .lease()
                .map(|l| &l.scope)
                .cmp(&other.lease().map(|l| &l.scope)),
            SortKey::LeaseLabel => self
                .lease()
                .map(|l| &l.label)
                .cmp(&other.lease().map(|l| &l.label)),
            SortKey::LeaseValue => self
                .lease()
                .map(|l| &l.value)
                .cmp(&other.lease().map(|l| &l.value)),
            SortKey::TagLabel => self.tag().map(|t| &t.label).cmp(&other.tag().map(|t| &t.label)),
            SortKey::TagValue => self.tag().map(|t| &t.value).cmp(&other.tag().map(|t| &t.value)),
            SortKey::Sequence => self.sequence.cmp(&other.sequence),
        }
    }
}

fn dedup_in_order<T: Eq + Hash + Copy>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(*item)).collect()
}

pub fn transaction_ids(records: Vec<Record>) -> Vec<TransactionId> {
    dedup_in_order(records.iter().map(|r| r.transaction_id))
}

pub fn entity_ids(records: Vec<Record>) -> Vec<EntityId> {
    dedup_in_order(records.iter().flat_map(|r| match &r.body {
        RecordBody::Transaction { entity_ids, .. } => entity_ids.clone(),
        _ => r.entity_id().into_iter().collect(),
    }))
}

pub fn agent_signatures(query: &Query, records: Vec<Record>) -> Result<Vec<AgentSignature>> {
    require_kind(query, RecordKind::Transaction)?;
    Ok(records
        .into_iter()
        .filter_map(|r| match r.body {
            RecordBody::Transaction { agent, .. } => Some(agent),
            _ => None,
        })
        .collect())
}

pub fn deltas(query: &Query, records: Vec<Record>) -> Result<Vec<Payload>> {
    require_kind(query, RecordKind::Delta)?;
    Ok(records
        .into_iter()
        .filter_map(|r| match r.body {
            RecordBody::Delta { delta, .. } => delta,
            _ => None,
        })
        .collect())
}

pub fn annotated_deltas(query: &Query, records: Vec<Record>) -> Result<Vec<AnnotatedDelta>> {
    require_kind(query, RecordKind::Delta)?;
    Ok(records
        .into_iter()
        .filter_map(|r| match r.body {
            RecordBody::Delta {
                entity_id,
                version,
                delta,
            } => Some(AnnotatedDelta {
                transaction_id: r.transaction_id,
                timestamp: r.timestamp,
                entity_id,
                version,
                delta,
            }),
            _ => None,
        })
        .collect())
}

pub fn leases(query: &Query, records: Vec<Record>) -> Result<Vec<Lease>> {
    require_kind(query, RecordKind::Lease)?;
    Ok(records
        .into_iter()
        .filter_map(|r| match r.body {
            RecordBody::Lease { lease, .. } => Some(lease),
            _ => None,
        })
        .collect())
}

pub fn tags(query: &Query, records: Vec<Record>) -> Result<Vec<Tag>> {
    require_kind(query, RecordKind::Tag)?;
    Ok(records
        .into_iter()
        .filter_map(|r| match r.body {
            RecordBody::Tag { tag, .. } => Some(tag),
            _ => None,
        })
        .collect())
}
