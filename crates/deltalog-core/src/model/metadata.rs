use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A globally unique claim held by an entity
///
/// At most one active lease with a given `(scope, label, value)` may exist
/// across the whole store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lease {
    pub scope: String,
    pub label: String,
    pub value: String,
}

impl Lease {
    pub fn new(
        scope: impl Into<String>,
        label: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A non-unique searchable annotation on an entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub value: String,
}

impl Tag {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Set-level change between two metadata snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff<T: Ord> {
    pub insert: BTreeSet<T>,
    pub delete: BTreeSet<T>,
}

impl<T: Ord> Default for Diff<T> {
    fn default() -> Self {
        Self {
            insert: BTreeSet::new(),
            delete: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> Diff<T> {
    /// Compute the diff that turns `before` into `after`
    pub fn between(before: &BTreeSet<T>, after: &BTreeSet<T>) -> Self {
        Self {
            insert: after.difference(before).cloned().collect(),
            delete: before.difference(after).cloned().collect(),
        }
    }

    pub fn inserting(item: T) -> Self {
        let mut diff = Self::default();
        diff.insert.insert(item);
        diff
    }

    pub fn deleting(item: T) -> Self {
        let mut diff = Self::default();
        diff.delete.insert(item);
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}
