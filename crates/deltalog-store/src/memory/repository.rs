use async_trait::async_trait;
use deltalog_core::commit::{check_batch, validate_steps};
use deltalog_core::{
    AgentSignature, AnnotatedDelta, CommitError, Lease, Payload, Query, RecordKind, Repository,
    SessionOptions, Tag, Transaction, VersionNumber,
};
use deltalog_core_types::{EntityId, TransactionId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::builders::execute;
use crate::errors::{lock_poisoned, Result};
use crate::record::{self, Record, RecordBody};

#[derive(Default)]
struct MemoryState {
    transactions: Vec<Record>,
    deltas: Vec<Record>,
    leases: Vec<Record>,
    tags: Vec<Record>,
    transaction_ids: HashSet<TransactionId>,
    versions: HashSet<(EntityId, VersionNumber)>,
    next_sequence: u64,
}

impl MemoryState {
    fn sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn stream(&self, kind: RecordKind) -> &[Record] {
        match kind {
            RecordKind::Transaction => &self.transactions,
            RecordKind::Delta => &self.deltas,
            RecordKind::Lease => &self.leases,
            RecordKind::Tag => &self.tags,
        }
    }

    /// Check a validated transaction against committed data
    fn check_committed(&self, transaction: &Transaction) -> Result<()> {
        if self.transaction_ids.contains(&transaction.id) {
            return Err(CommitError::DuplicateTransaction {
                transaction_id: transaction.id,
            });
        }

        let mut active: HashMap<&Lease, EntityId> = self
            .leases
            .iter()
            .filter_map(|r| match &r.body {
                RecordBody::Lease {
                    entity_id, lease, ..
                } => Some((lease, *entity_id)),
                _ => None,
            })
            .collect();

        for step in &transaction.steps {
            if self.versions.contains(&(step.entity_id, step.next_version)) {
                return Err(CommitError::OptimisticConcurrency {
                    reason: format!(
                        "entity {} already has version {}",
                        step.entity_id, step.next_version
                    ),
                });
            }
            for lease in &step.leases.delete {
                if active.get(lease) == Some(&step.entity_id) {
                    active.remove(lease);
                }
            }
            for lease in &step.leases.insert {
                if let Some(holder) = active.get(lease) {
                    return Err(CommitError::OptimisticConcurrency {
                        reason: format!(
                            "lease ({}, {}, {}) is held by entity {}",
                            lease.scope, lease.label, lease.value, holder
                        ),
                    });
                }
                active.insert(lease, step.entity_id);
            }
        }
        Ok(())
    }

    fn apply(&mut self, transaction: &Transaction) {
        let sequence = self.sequence();
        self.transactions.push(Record {
            sequence,
            transaction_id: transaction.id,
            timestamp: transaction.timestamp,
            body: RecordBody::Transaction {
                agent: transaction.agent.clone(),
                entity_ids: transaction.entity_ids(),
            },
        });
        self.transaction_ids.insert(transaction.id);

        for step in &transaction.steps {
            let entity_id = step.entity_id;
            let version = step.next_version;

            let sequence = self.sequence();
            self.deltas.push(Record {
                sequence,
                transaction_id: transaction.id,
                timestamp: transaction.timestamp,
                body: RecordBody::Delta {
                    entity_id,
                    version,
                    delta: step.delta.clone(),
                },
            });
            self.versions.insert((entity_id, version));

            self.leases.retain(|r| {
                !matches!(&r.body, RecordBody::Lease { entity_id: holder, lease, .. }
                    if *holder == entity_id && step.leases.delete.contains(lease))
            });
            for lease in &step.leases.insert {
                let sequence = self.sequence();
                self.leases.push(Record {
                    sequence,
                    transaction_id: transaction.id,
                    timestamp: transaction.timestamp,
                    body: RecordBody::Lease {
                        entity_id,
                        version,
                        lease: lease.clone(),
                    },
                });
            }

            self.tags.retain(|r| {
                !matches!(&r.body, RecordBody::Tag { entity_id: holder, tag, .. }
                    if *holder == entity_id && step.tags.delete.contains(tag))
            });
            for tag in &step.tags.insert {
                let sequence = self.sequence();
                self.tags.push(Record {
                    sequence,
                    transaction_id: transaction.id,
                    timestamp: transaction.timestamp,
                    body: RecordBody::Tag {
                        entity_id,
                        version,
                        tag: tag.clone(),
                    },
                });
            }
        }
    }
}

/// Repository keeping all record streams in memory
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    options: SessionOptions,
}

impl MemoryRepository {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            options,
        }
    }

    /// A handle over the same data with different session options
    pub fn with_options(&self, options: SessionOptions) -> Self {
        Self {
            state: self.state.clone(),
            options,
        }
    }

    fn scan(&self, query: &Query) -> Result<Vec<Record>> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(execute(state.stream(query.record_kind()), query))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn enumerate_transaction_ids(&self, query: &Query) -> Result<Vec<TransactionId>> {
        Ok(record::transaction_ids(self.scan(query)?))
    }

    async fn enumerate_entity_ids(&self, query: &Query) -> Result<Vec<EntityId>> {
        Ok(record::entity_ids(self.scan(query)?))
    }

    async fn enumerate_agent_signatures(&self, query: &Query) -> Result<Vec<AgentSignature>> {
        record::agent_signatures(query, self.scan(query)?)
    }

    async fn enumerate_deltas(&self, query: &Query) -> Result<Vec<Payload>> {
        record::deltas(query, self.scan(query)?)
    }

    async fn enumerate_leases(&self, query: &Query) -> Result<Vec<Lease>> {
        record::leases(query, self.scan(query)?)
    }

    async fn enumerate_tags(&self, query: &Query) -> Result<Vec<Tag>> {
        record::tags(query, self.scan(query)?)
    }

    async fn enumerate_annotated_deltas(&self, query: &Query) -> Result<Vec<AnnotatedDelta>> {
        record::annotated_deltas(query, self.scan(query)?)
    }

    async fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        if self.options.read_only {
            return Err(CommitError::CannotWriteInReadOnlyMode);
        }
        validate_steps(transaction)?;
        check_batch(transaction)?;

        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state.check_committed(transaction)?;
        state.apply(transaction);

        tracing::debug!(
            transaction_id = %transaction.id,
            step_count = transaction.steps.len(),
            "transaction stored in memory"
        );
        Ok(())
    }
}
