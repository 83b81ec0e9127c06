//! Repository collaborator contracts
//!
//! A repository persists transactions as four record streams (transactions,
//! deltas, leases, tags) and answers [`Query`] values over them. The query's
//! [`RecordKind`] selects the scanned stream; each enumeration projects the
//! matching records after sort, skip and take have been applied.
//!
//! | Operation                    | Accepted record kinds |
//! |------------------------------|-----------------------|
//! | `enumerate_transaction_ids`  | all                   |
//! | `enumerate_entity_ids`       | all                   |
//! | `enumerate_agent_signatures` | transaction           |
//! | `enumerate_deltas`           | delta                 |
//! | `enumerate_annotated_deltas` | delta                 |
//! | `enumerate_leases`           | lease                 |
//! | `enumerate_tags`             | tag                   |
//!
//! Id enumerations remove duplicates while keeping first-seen order. Any
//! other pairing fails with [`CommitError::UnsupportedQuery`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deltalog_core_types::{EntityId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::errors::{BuilderError, CommitError};
use crate::model::{AgentSignature, Lease, Payload, Tag, Transaction, VersionNumber, Versioned};
use crate::query::{Query, RecordKind};

/// A step record together with the transaction metadata it was committed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDelta {
    pub transaction_id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub entity_id: EntityId,
    pub version: VersionNumber,
    /// `None` for metadata-only steps
    pub delta: Option<Payload>,
}

/// Storage backend for committed transactions
///
/// Implementations must commit a transaction atomically and enforce:
/// global uniqueness of transaction ids, uniqueness of `(entity, version)`,
/// and uniqueness of active leases. Tags are never unique.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn enumerate_transaction_ids(
        &self,
        query: &Query,
    ) -> Result<Vec<TransactionId>, CommitError>;

    async fn enumerate_entity_ids(&self, query: &Query) -> Result<Vec<EntityId>, CommitError>;

    async fn enumerate_agent_signatures(
        &self,
        query: &Query,
    ) -> Result<Vec<AgentSignature>, CommitError>;

    /// Delta payloads of matching steps; metadata-only steps are skipped
    async fn enumerate_deltas(&self, query: &Query) -> Result<Vec<Payload>, CommitError>;

    async fn enumerate_leases(&self, query: &Query) -> Result<Vec<Lease>, CommitError>;

    async fn enumerate_tags(&self, query: &Query) -> Result<Vec<Tag>, CommitError>;

    async fn enumerate_annotated_deltas(
        &self,
        query: &Query,
    ) -> Result<Vec<AnnotatedDelta>, CommitError>;

    /// Persist every step of the transaction or none of them
    async fn put_transaction(&self, transaction: &Transaction) -> Result<(), CommitError>;
}

/// Fail with [`CommitError::UnsupportedQuery`] unless the query scans `expected`
///
/// # Errors
///
/// Returns `UnsupportedQuery` when the record kinds differ.
pub fn require_kind(query: &Query, expected: RecordKind) -> Result<(), CommitError> {
    let actual = query.record_kind();
    if actual == expected {
        Ok(())
    } else {
        Err(CommitError::UnsupportedQuery { expected, actual })
    }
}

/// Source of current entity values for [`EntityBuilder::load`](crate::builder::EntityBuilder::load)
///
/// An entity without committed history is returned at version 0.
#[async_trait]
pub trait EntityReader<E: Entity>: Send + Sync {
    async fn get(&self, entity_id: EntityId) -> Result<Versioned<E>, BuilderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_kind_reports_both_kinds() {
        let query = Query::tag(None, None);
        assert!(require_kind(&query, RecordKind::Tag).is_ok());

        let err = require_kind(&query, RecordKind::Lease).unwrap_err();
        assert_eq!(
            err,
            CommitError::UnsupportedQuery {
                expected: RecordKind::Lease,
                actual: RecordKind::Tag,
            }
        );
    }
}
