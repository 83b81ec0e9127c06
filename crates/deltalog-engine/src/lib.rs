//! Deltalog Engine - Orchestration layer
//!
//! Coordinates core domain logic with a repository backend:
//! - Resilient repository wrapper that turns failures into defaults plus a log entry
//! - Commit protocol with subscriber dispatch
//! - Snapshot subscription pipeline
//! - Snapshot-and-replay entity reader for `EntityBuilder::load`
//!
//! ## Logging Ownership
//!
//! The engine owns lifecycle and failure logging (`log_op_*!`), always
//! tagged with the component's `scope_id`. Lower layers only use
//! `tracing::debug!()`.

pub mod pipeline;
pub mod reader;
pub mod resilient;
pub mod subscribers;
pub mod transaction_repository;

pub use pipeline::{SnapshotPipeline, SnapshotReport};
pub use reader::SnapshotReplayReader;
pub use resilient::ResilientRepository;
pub use subscribers::{DispatchHandle, DispatchSummary, Subscribers, TransactionSubscriber};
pub use transaction_repository::TransactionRepository;
