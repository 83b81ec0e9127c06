//! In-memory backend
//!
//! Keeps every record stream in process memory behind a mutex. Intended for
//! tests and for embedders that do not need durability.

mod builders;
mod repository;
mod snapshot;

pub use builders::{execute, MemoryFilterBuilder, MemorySortBuilder};
pub use repository::MemoryRepository;
pub use snapshot::MemorySnapshotStore;
