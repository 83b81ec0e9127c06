//! Error helpers for deltalog-store
//!
//! Backends report everything as [`CommitError`]; these helpers classify
//! SQLite failures and build the common variants.

use deltalog_core::errors::CommitError;

/// Result type alias using CommitError
pub type Result<T> = std::result::Result<T, CommitError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> CommitError {
    CommitError::Backend {
        message: format!("Migration {} failed: {}", migration_id, reason),
    }
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> CommitError {
    CommitError::Backend {
        message: format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ),
    }
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> CommitError {
    CommitError::Backend {
        message: err.to_string(),
    }
}

/// Create a serialization error from serde_json::Error
pub fn from_serde(err: serde_json::Error) -> CommitError {
    CommitError::Serialization {
        message: err.to_string(),
    }
}

/// Create a decoding error for a malformed stored column
pub fn corrupt_column(column: &str, value: &str) -> CommitError {
    CommitError::Serialization {
        message: format!("Malformed {} column: {}", column, value),
    }
}

/// Error for a poisoned in-memory lock
pub fn lock_poisoned() -> CommitError {
    CommitError::Backend {
        message: "store lock poisoned".to_string(),
    }
}

/// Whether a SQLite error is a UNIQUE/CHECK constraint violation
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Map a failed insert: constraint violations become `on_conflict`
pub fn classify_insert(
    err: rusqlite::Error,
    on_conflict: impl FnOnce() -> CommitError,
) -> CommitError {
    if is_constraint_violation(&err) {
        on_conflict()
    } else {
        from_rusqlite(err)
    }
}
