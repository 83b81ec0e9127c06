//! Deltalog Store - Repository and snapshot store backends
//!
//! Provides:
//! - In-memory repository and snapshot store
//! - SQLite repository and snapshot store with a migrations framework
//! - Backend-neutral record rows shared by both backends

pub mod db;
pub mod errors;
pub mod memory;
pub mod migrations;
pub mod record;
pub mod sqlite;

// Re-export key types
pub use errors::Result;
pub use memory::{MemoryRepository, MemorySnapshotStore};
pub use migrations::apply_migrations;
pub use sqlite::{SqliteHandle, SqliteRepository, SqliteSnapshotStore};
