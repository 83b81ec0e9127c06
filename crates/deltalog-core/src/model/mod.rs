pub mod metadata;
pub mod transaction;
pub mod version;

pub use metadata::{Diff, Lease, Tag};
pub use transaction::{AgentSignature, Payload, Step, StepState, Transaction, Versioned};
pub use version::VersionNumber;
