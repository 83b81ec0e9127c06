//! Core types shared across deltalog crates
//!
//! This crate provides the foundational types used by the data model,
//! the error facility and the logging facility:
//!
//! - **Identifiers**: EntityId, TransactionId, ScopeId
//! - **Schema constants**: Canonical field keys and event names

pub mod ids;
pub mod schema;

pub use ids::{EntityId, ScopeId, TransactionId};
