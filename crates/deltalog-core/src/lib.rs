//! deltalog Core - event-sourcing kernel
//!
//! This crate provides the storage-agnostic parts of deltalog:
//! - The versioned record model (steps, leases, tags, transactions)
//! - Backend-agnostic query, filter and sort composition
//! - The entity builder that assembles transactions in memory
//! - Commit-integrity validation shared by every backend
//! - Collaborator traits for repositories, snapshot stores and readers
//! - Session options, the error facility and the logging facility

pub mod builder;
pub mod commit;
pub mod entity;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod options;
pub mod query;
pub mod repository;
pub mod snapshot;

pub use deltalog_core_types as core_types;

#[doc(hidden)]
pub use tracing as __tracing;

// Re-export commonly used types
pub use builder::EntityBuilder;
pub use entity::{Authorization, Entity};
pub use errors::{BuilderError, CommitError, ExError, ExErrorKind, Result};
pub use model::{
    AgentSignature, Diff, Lease, Payload, Step, StepState, Tag, Transaction, VersionNumber,
    Versioned,
};
pub use options::SessionOptions;
pub use query::{
    Filter, FilterBuilder, ModifiedQueryOptions, Predicate, Query, RecordKind, Reverse, SortBuilder,
    SortKey,
};
pub use repository::{AnnotatedDelta, EntityReader, Repository};
pub use snapshot::{SnapshotStore, SnapshotWrite};
