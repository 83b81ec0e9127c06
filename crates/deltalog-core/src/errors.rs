use deltalog_core_types::{EntityId, ScopeId, TransactionId};
use thiserror::Error;

use crate::model::VersionNumber;
use crate::query::RecordKind;

/// Result type alias for builder operations
pub type Result<T> = std::result::Result<T, BuilderError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every error raised by deltalog maps to exactly one kind, and every kind
/// maps to a stable code that log consumers and tests can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Builder usage
    EntityAlreadyKnown,
    EntityAlreadyCreated,
    EntityNotLoaded,
    EntityNotCreated,
    CommandNotAuthorized,

    // Commit integrity
    VersionZeroReserved,
    VersionNotSequential,
    DuplicateTransaction,
    UniquenessConflict,
    OptimisticConcurrency,
    ReadOnly,

    // Backend / transport
    UnsupportedQuery,
    Timeout,
    Persistence,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::EntityAlreadyKnown => "ERR_ENTITY_ALREADY_KNOWN",
            ExErrorKind::EntityAlreadyCreated => "ERR_ENTITY_ALREADY_CREATED",
            ExErrorKind::EntityNotLoaded => "ERR_ENTITY_NOT_LOADED",
            ExErrorKind::EntityNotCreated => "ERR_ENTITY_NOT_CREATED",
            ExErrorKind::CommandNotAuthorized => "ERR_COMMAND_NOT_AUTHORIZED",
            ExErrorKind::VersionZeroReserved => "ERR_VERSION_ZERO_RESERVED",
            ExErrorKind::VersionNotSequential => "ERR_VERSION_NOT_SEQUENTIAL",
            ExErrorKind::DuplicateTransaction => "ERR_DUPLICATE_TRANSACTION",
            ExErrorKind::UniquenessConflict => "ERR_UNIQUENESS_CONFLICT",
            ExErrorKind::OptimisticConcurrency => "ERR_OPTIMISTIC_CONCURRENCY",
            ExErrorKind::ReadOnly => "ERR_READ_ONLY",
            ExErrorKind::UnsupportedQuery => "ERR_UNSUPPORTED_QUERY",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification used for programmatic handling plus the
/// context (operation, entity, transaction, scope) needed to act on a log
/// entry without reproducing the failure.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    transaction_id: Option<String>,
    scope_id: Option<ScopeId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            transaction_id: None,
            scope_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    /// Add transaction ID context
    pub fn with_transaction_id(mut self, id: impl ToString) -> Self {
        self.transaction_id = Some(id.to_string());
        self
    }

    /// Add the correlating scope of the repository handle that saw the error
    pub fn with_scope_id(mut self, scope_id: ScopeId) -> Self {
        self.scope_id = Some(scope_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn scope_id(&self) -> Option<ScopeId> {
        self.scope_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(transaction_id) = &self.transaction_id {
            write!(f, " (transaction_id: {})", transaction_id)?;
        }
        if let Some(scope_id) = &self.scope_id {
            write!(f, " (scope_id: {})", scope_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Misuse of the entity builder's state machine
///
/// These are contract violations by the immediate caller. They are returned
/// synchronously and are never logged and swallowed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuilderError {
    /// The entity is already tracked by this builder
    #[error("Entity already known to this builder: {entity_id}")]
    EntityAlreadyKnown { entity_id: EntityId },

    /// The entity already has committed history and cannot be created again
    #[error("Entity already created: {entity_id}")]
    EntityAlreadyCreated { entity_id: EntityId },

    /// Append on an entity that was neither loaded nor created
    #[error("Entity not loaded: {entity_id}")]
    EntityNotLoaded { entity_id: EntityId },

    /// Load found no committed history for the entity
    #[error("Entity not created: {entity_id}")]
    EntityNotCreated { entity_id: EntityId },

    /// The configured authorization strategy rejected the delta
    #[error("Delta {delta_type} not authorized for entity {entity_id}")]
    CommandNotAuthorized {
        entity_id: EntityId,
        delta_type: String,
    },

    /// A delta could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// Commit-integrity and backend failures
///
/// Never thrown across the repository boundary: the engine reduces every
/// one of these to `false` or an empty result plus a structured log entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    /// A step tried to claim version 0
    #[error("Version 0 is reserved and cannot be committed (entity {entity_id})")]
    VersionZeroReserved { entity_id: EntityId },

    /// A step's next version is not its previous version plus one
    #[error("Step for entity {entity_id} goes from version {previous} to {next}")]
    VersionNotSequential {
        entity_id: EntityId,
        previous: VersionNumber,
        next: VersionNumber,
    },

    /// The transaction id was committed before
    #[error("Transaction already committed: {transaction_id}")]
    DuplicateTransaction { transaction_id: TransactionId },

    /// Two records in the same batch claim the same unique key
    #[error("Uniqueness conflict within batch: {reason}")]
    UniquenessConflict { reason: String },

    /// A unique key is already held by a previously committed transaction
    #[error("Optimistic concurrency conflict: {reason}")]
    OptimisticConcurrency { reason: String },

    /// Writes are disabled for this session
    #[error("Cannot write in read-only mode")]
    CannotWriteInReadOnlyMode,

    /// The query targets a record stream the operation cannot project
    #[error("Operation expects a {expected} query but received a {actual} query")]
    UnsupportedQuery {
        expected: RecordKind,
        actual: RecordKind,
    },

    /// The backend did not answer within the configured timeout
    #[error("Operation '{op}' timed out")]
    Timeout { op: String },

    /// Any other backend or transport failure
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// A stored record could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CommitError {
    /// Whether reloading, recomputing and resubmitting can succeed
    ///
    /// Only a conflict with another writer qualifies; every other failure
    /// repeats deterministically for the same transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommitError::OptimisticConcurrency { .. })
    }
}

impl From<BuilderError> for ExError {
    fn from(err: BuilderError) -> Self {
        let message = err.to_string();
        match err {
            BuilderError::EntityAlreadyKnown { entity_id } => {
                ExError::new(ExErrorKind::EntityAlreadyKnown).with_entity_id(entity_id)
            }
            BuilderError::EntityAlreadyCreated { entity_id } => {
                ExError::new(ExErrorKind::EntityAlreadyCreated).with_entity_id(entity_id)
            }
            BuilderError::EntityNotLoaded { entity_id } => {
                ExError::new(ExErrorKind::EntityNotLoaded).with_entity_id(entity_id)
            }
            BuilderError::EntityNotCreated { entity_id } => {
                ExError::new(ExErrorKind::EntityNotCreated).with_entity_id(entity_id)
            }
            BuilderError::CommandNotAuthorized { entity_id, .. } => {
                ExError::new(ExErrorKind::CommandNotAuthorized).with_entity_id(entity_id)
            }
            BuilderError::Serialization { .. } => ExError::new(ExErrorKind::Serialization),
        }
        .with_message(message)
    }
}

impl From<CommitError> for ExError {
    fn from(err: CommitError) -> Self {
        let message = err.to_string();
        match err {
            CommitError::VersionZeroReserved { entity_id } => {
                ExError::new(ExErrorKind::VersionZeroReserved).with_entity_id(entity_id)
            }
            CommitError::VersionNotSequential { entity_id, .. } => {
                ExError::new(ExErrorKind::VersionNotSequential).with_entity_id(entity_id)
            }
            CommitError::DuplicateTransaction { transaction_id } => {
                ExError::new(ExErrorKind::DuplicateTransaction).with_transaction_id(transaction_id)
            }
            CommitError::UniquenessConflict { .. } => {
                ExError::new(ExErrorKind::UniquenessConflict)
            }
            CommitError::OptimisticConcurrency { .. } => {
                ExError::new(ExErrorKind::OptimisticConcurrency)
            }
            CommitError::CannotWriteInReadOnlyMode => ExError::new(ExErrorKind::ReadOnly),
            CommitError::UnsupportedQuery { .. } => ExError::new(ExErrorKind::UnsupportedQuery),
            CommitError::Timeout { op } => ExError::new(ExErrorKind::Timeout).with_op(op),
            CommitError::Backend { .. } => ExError::new(ExErrorKind::Persistence),
            CommitError::Serialization { .. } => ExError::new(ExErrorKind::Serialization),
        }
        .with_message(message)
    }
}
