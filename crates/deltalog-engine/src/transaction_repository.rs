//! Commit protocol
//!
//! `put_transaction` runs, in order:
//! 1. read-only check (the backend is never touched in read-only sessions)
//! 2. step validation (`validate_steps`)
//! 3. the backend write through the resilient wrapper
//! 4. subscriber dispatch, awaited only in blocking mode
//!
//! Every rejection is reported as `false` with one `end_error` log entry.
//! Nothing is retried here; a caller seeing `false` after an optimistic
//! concurrency conflict reloads, rebuilds and resubmits.

use deltalog_core::commit::validate_steps;
use deltalog_core::{
    log_op_end, log_op_error, log_op_start, CommitError, Repository, SessionOptions, Transaction,
};
use deltalog_core_types::ScopeId;
use std::sync::Arc;
use std::time::Instant;

use crate::resilient::{emit_with, ResilientRepository};
use crate::subscribers::{Subscribers, TransactionSubscriber};

pub struct TransactionRepository<R> {
    repository: ResilientRepository<R>,
    subscribers: Subscribers,
    blocking: bool,
}

impl<R: Repository> TransactionRepository<R> {
    pub fn new(inner: R, options: SessionOptions) -> Self {
        Self::from_resilient(ResilientRepository::new(inner, options))
    }

    pub fn from_resilient(repository: ResilientRepository<R>) -> Self {
        Self {
            repository,
            subscribers: Subscribers::new(),
            blocking: false,
        }
    }

    /// Make `put_transaction` wait for every subscriber before returning
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn TransactionSubscriber>) -> Self {
        self.subscribers.register(subscriber);
        self
    }

    pub fn register(&mut self, subscriber: Arc<dyn TransactionSubscriber>) {
        self.subscribers.register(subscriber);
    }

    /// Read access to the same backend, with the same failure handling
    pub fn repository(&self) -> &ResilientRepository<R> {
        &self.repository
    }

    pub fn scope_id(&self) -> ScopeId {
        self.repository.scope_id()
    }

    /// Commit one transaction and notify subscribers
    ///
    /// Returns `true` once the backend has stored the transaction. Subscriber
    /// failures are logged and never change the result.
    pub async fn put_transaction(&self, transaction: Transaction) -> bool {
        let options = self.repository.options();
        let scope_id = self.repository.scope_id();
        let start = Instant::now();
        emit_with(options, || {
            log_op_start!(
                "commit_transaction",
                scope_id = %scope_id,
                transaction_id = %transaction.id,
                step_count = transaction.steps.len()
            );
        });

        if let Err(err) = precheck(options, &transaction) {
            emit_with(options, || {
                log_op_error!(
                    "commit_transaction",
                    err,
                    duration_ms = start.elapsed().as_millis() as u64,
                    scope_id = %scope_id,
                    transaction_id = %transaction.id
                );
            });
            return false;
        }

        if !self.repository.put_transaction(&transaction).await {
            return false;
        }

        let transaction_id = transaction.id;
        let handle = self
            .subscribers
            .dispatch(Arc::new(transaction), scope_id, options);
        if self.blocking {
            let summary = handle.wait().await;
            emit_with(options, || {
                tracing::debug!(
                    %transaction_id,
                    delivered = summary.delivered,
                    failed = summary.failed,
                    "subscribers finished"
                );
            });
        }

        emit_with(options, || {
            log_op_end!(
                "commit_transaction",
                duration_ms = start.elapsed().as_millis() as u64,
                scope_id = %scope_id,
                transaction_id = %transaction_id
            );
        });
        true
    }
}

fn precheck(options: &SessionOptions, transaction: &Transaction) -> Result<(), CommitError> {
    if options.read_only {
        return Err(CommitError::CannotWriteInReadOnlyMode);
    }
    validate_steps(transaction)
}
