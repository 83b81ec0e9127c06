//! Commit-integrity checks shared by every backend
//!
//! These checks only look at the transaction itself. Conflicts with
//! previously committed data are detected by the backend during its atomic
//! write and reported as [`CommitError::OptimisticConcurrency`].

use deltalog_core_types::EntityId;
use std::collections::{HashMap, HashSet};

use crate::errors::CommitError;
use crate::model::{Lease, Transaction, VersionNumber};

/// Check that every step advances its entity by exactly one version
///
/// # Errors
///
/// - `VersionZeroReserved` if a step claims version 0
/// - `VersionNotSequential` if `next_version != previous_version + 1`
pub fn validate_steps(transaction: &Transaction) -> Result<(), CommitError> {
    for step in &transaction.steps {
        if step.next_version.is_zero() {
            return Err(CommitError::VersionZeroReserved {
                entity_id: step.entity_id,
            });
        }
        if step.next_version != step.previous_version.next() {
            return Err(CommitError::VersionNotSequential {
                entity_id: step.entity_id,
                previous: step.previous_version,
                next: step.next_version,
            });
        }
    }
    Ok(())
}

/// Check uniqueness rules inside one batch
///
/// Steps are applied in order: a step's lease deletions take effect before
/// its insertions, so a lease released earlier in the batch may be claimed
/// again later in the same batch. Only the holding entity can release a
/// lease; a delete issued by any other entity leaves it held. Tags are not
/// checked.
///
/// # Errors
///
/// Returns `UniquenessConflict` if two steps claim the same
/// `(entity, version)` or the same lease is inserted twice while active.
pub fn check_batch(transaction: &Transaction) -> Result<(), CommitError> {
    let mut versions: HashSet<(EntityId, VersionNumber)> = HashSet::new();
    let mut leases: HashMap<&Lease, EntityId> = HashMap::new();

    for step in &transaction.steps {
        if !versions.insert((step.entity_id, step.next_version)) {
            return Err(CommitError::UniquenessConflict {
                reason: format!(
                    "entity {} version {} appears twice",
                    step.entity_id, step.next_version
                ),
            });
        }

        for lease in &step.leases.delete {
            if leases.get(lease) == Some(&step.entity_id) {
                leases.remove(lease);
            }
        }
        for lease in &step.leases.insert {
            if let Some(holder) = leases.get(lease) {
                return Err(CommitError::UniquenessConflict {
                    reason: format!(
                        "lease ({}, {}, {}) inserted twice, first by entity {}",
                        lease.scope, lease.label, lease.value, holder
                    ),
                });
            }
            leases.insert(lease, step.entity_id);
        }
    }
    Ok(())
}
