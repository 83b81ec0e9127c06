//! Entity-type collaborator contracts
//!
//! Application code defines what an entity is and how deltas change it. The
//! kernel only relies on the pure functions declared here.

use deltalog_core_types::EntityId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::model::{Lease, Tag, Versioned};

/// A logical aggregate reconstructed by replaying its deltas
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The delta type accepted by [`Entity::reduce`]
    type Delta: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Type name recorded with every encoded delta
    const DELTA_TYPE: &'static str;

    /// Value of an entity that has no recorded steps yet
    fn construct(entity_id: EntityId) -> Self;

    /// Apply one delta; must be pure
    fn reduce(&self, delta: &Self::Delta) -> Self;

    /// Globally unique claims this value holds
    fn leases(&self) -> BTreeSet<Lease> {
        BTreeSet::new()
    }

    /// Searchable annotations of this value
    fn tags(&self) -> BTreeSet<Tag> {
        BTreeSet::new()
    }

    /// Whether `candidate` may replace the stored most-recent snapshot
    ///
    /// Defaults to accepting only strictly newer versions, so a late
    /// notification never overwrites a fresher snapshot.
    fn should_record_as_most_recent(
        candidate: &Versioned<Self>,
        previous: Option<&Versioned<Self>>,
    ) -> bool {
        previous.map_or(true, |prev| candidate.version > prev.version)
    }

    /// Whether `candidate` is kept in the version-indexed history
    fn should_record(_candidate: &Versioned<Self>) -> bool {
        false
    }
}

/// Pluggable authorization strategy for appending deltas
pub trait Authorization<E: Entity>: Send + Sync {
    fn is_authorized(&self, entity: &Versioned<E>, delta: &E::Delta) -> bool;
}

impl<E, F> Authorization<E> for F
where
    E: Entity,
    F: Fn(&Versioned<E>, &E::Delta) -> bool + Send + Sync,
{
    fn is_authorized(&self, entity: &Versioned<E>, delta: &E::Delta) -> bool {
        self(entity, delta)
    }
}
