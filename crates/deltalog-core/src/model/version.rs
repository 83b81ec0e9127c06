use serde::{Deserialize, Serialize};

/// Per-entity step counter
///
/// Version 0 means the entity has no recorded steps. The first committed
/// step of an entity carries version 1 and every later step adds one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionNumber(pub u64);

impl VersionNumber {
    /// The reserved "does not exist yet" version
    pub const ZERO: VersionNumber = VersionNumber(0);

    /// The version that follows this one
    pub fn next(self) -> VersionNumber {
        VersionNumber(self.0.saturating_add(1))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for VersionNumber {
    fn from(value: u64) -> Self {
        VersionNumber(value)
    }
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
