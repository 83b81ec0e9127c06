//! Query composition layer
//!
//! Queries are plain values describing a filter, a sort order and optional
//! pagination over one record stream. Composition (`filtered`, `modified`)
//! wraps an existing query instead of mutating it, and backends only supply
//! a [`FilterBuilder`] and a [`SortBuilder`] to execute any query kind.

pub mod compose;
pub mod filter;
pub mod sort;

pub use compose::{ModifiedQueryOptions, Query};
pub use filter::{Filter, FilterBuilder, Predicate};
pub use sort::{Reverse, SortBuilder, SortKey, SortOrder, SortTerm};

/// The durable record stream a query scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// One record per committed transaction (agent signature)
    Transaction,
    /// One record per step
    Delta,
    /// One record per active lease
    Lease,
    /// One record per active tag
    Tag,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::Transaction => "transaction",
            RecordKind::Delta => "delta",
            RecordKind::Lease => "lease",
            RecordKind::Tag => "tag",
        };
        f.write_str(name)
    }
}
