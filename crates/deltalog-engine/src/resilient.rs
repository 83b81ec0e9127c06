//! Resilient repository wrapper
//!
//! Every call on [`ResilientRepository`] either returns the backend's result
//! unchanged or, on failure, logs exactly one `end_error` entry tagged with
//! the wrapper's `scope_id` and returns a default (empty vector, `false`).
//! Nothing propagates to the caller.

use deltalog_core::{
    log_op_error, AgentSignature, AnnotatedDelta, CommitError, ExError, Lease, Payload, Query,
    Repository, SessionOptions, Tag, Transaction,
};
use deltalog_core_types::{EntityId, ScopeId, TransactionId};
use std::future::Future;
use std::time::Instant;

#[derive(Clone)]
pub struct ResilientRepository<R> {
    inner: R,
    scope_id: ScopeId,
    options: SessionOptions,
}

impl<R: Repository> ResilientRepository<R> {
    /// Wrap `inner` under a fresh scope id
    pub fn new(inner: R, options: SessionOptions) -> Self {
        Self::with_scope(inner, ScopeId::new(), options)
    }

    pub fn with_scope(inner: R, scope_id: ScopeId, options: SessionOptions) -> Self {
        Self {
            inner,
            scope_id,
            options,
        }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub async fn enumerate_transaction_ids(&self, query: &Query) -> Vec<TransactionId> {
        self.guard(
            "enumerate_transaction_ids",
            query,
            self.inner.enumerate_transaction_ids(query),
        )
        .await
    }

    pub async fn enumerate_entity_ids(&self, query: &Query) -> Vec<EntityId> {
        self.guard(
            "enumerate_entity_ids",
            query,
            self.inner.enumerate_entity_ids(query),
        )
        .await
    }

    pub async fn enumerate_agent_signatures(&self, query: &Query) -> Vec<AgentSignature> {
        self.guard(
            "enumerate_agent_signatures",
            query,
            self.inner.enumerate_agent_signatures(query),
        )
        .await
    }

    pub async fn enumerate_deltas(&self, query: &Query) -> Vec<Payload> {
        self.guard("enumerate_deltas", query, self.inner.enumerate_deltas(query))
            .await
    }

    pub async fn enumerate_leases(&self, query: &Query) -> Vec<Lease> {
        self.guard("enumerate_leases", query, self.inner.enumerate_leases(query))
            .await
    }

    pub async fn enumerate_tags(&self, query: &Query) -> Vec<Tag> {
        self.guard("enumerate_tags", query, self.inner.enumerate_tags(query))
            .await
    }

    pub async fn enumerate_annotated_deltas(&self, query: &Query) -> Vec<AnnotatedDelta> {
        self.guard(
            "enumerate_annotated_deltas",
            query,
            self.inner.enumerate_annotated_deltas(query),
        )
        .await
    }

    /// Commit through the backend; `false` means the transaction was not stored
    pub async fn put_transaction(&self, transaction: &Transaction) -> bool {
        let start = Instant::now();
        match self.inner.put_transaction(transaction).await {
            Ok(()) => true,
            Err(err) => {
                self.emit(|| {
                    log_op_error!(
                        "put_transaction",
                        self.tagged("put_transaction", err),
                        duration_ms = start.elapsed().as_millis() as u64,
                        scope_id = %self.scope_id,
                        transaction_id = %transaction.id,
                        step_count = transaction.steps.len()
                    );
                });
                false
            }
        }
    }

    async fn guard<T, F>(&self, op: &'static str, query: &Query, call: F) -> Vec<T>
    where
        F: Future<Output = Result<Vec<T>, CommitError>>,
    {
        let start = Instant::now();
        match call.await {
            Ok(rows) => {
                self.emit(|| {
                    tracing::debug!(op, scope_id = %self.scope_id, result_count = rows.len());
                });
                rows
            }
            Err(err) => {
                self.emit(|| {
                    log_op_error!(
                        op,
                        self.tagged(op, err),
                        duration_ms = start.elapsed().as_millis() as u64,
                        scope_id = %self.scope_id,
                        record = %query.record_kind()
                    );
                });
                Vec::new()
            }
        }
    }

    fn tagged(&self, op: &'static str, err: CommitError) -> ExError {
        ExError::from(err).with_op(op).with_scope_id(self.scope_id)
    }

    /// Route a log emission to the session's logger override, if any
    fn emit(&self, log: impl FnOnce()) {
        emit_with(&self.options, log)
    }
}

/// Run `log` under the session's logger override, or the global logger
pub(crate) fn emit_with(options: &SessionOptions, log: impl FnOnce()) {
    match &options.logger {
        Some(dispatch) => tracing::dispatcher::with_default(dispatch, log),
        None => log(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalog_core::logging_facility::TestCaptureLayer;
    use deltalog_core::RecordKind;

    struct Unavailable;

    #[async_trait::async_trait]
    impl Repository for Unavailable {
        async fn enumerate_transaction_ids(
            &self,
            _query: &Query,
        ) -> Result<Vec<TransactionId>, CommitError> {
            Err(CommitError::Backend {
                message: "offline".into(),
            })
        }
        async fn enumerate_entity_ids(&self, _query: &Query) -> Result<Vec<EntityId>, CommitError> {
            Ok(vec![EntityId::new()])
        }
        async fn enumerate_agent_signatures(
            &self,
            _query: &Query,
        ) -> Result<Vec<AgentSignature>, CommitError> {
            Ok(Vec::new())
        }
        async fn enumerate_deltas(&self, _query: &Query) -> Result<Vec<Payload>, CommitError> {
            Ok(Vec::new())
        }
        async fn enumerate_leases(&self, _query: &Query) -> Result<Vec<Lease>, CommitError> {
            Ok(Vec::new())
        }
        async fn enumerate_tags(&self, _query: &Query) -> Result<Vec<Tag>, CommitError> {
            Ok(Vec::new())
        }
        async fn enumerate_annotated_deltas(
            &self,
            _query: &Query,
        ) -> Result<Vec<AnnotatedDelta>, CommitError> {
            Ok(Vec::new())
        }
        async fn put_transaction(&self, _transaction: &Transaction) -> Result<(), CommitError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_logger_override_receives_failures() {
        let (dispatch, capture) = TestCaptureLayer::dispatch();
        let repo = ResilientRepository::new(Unavailable, SessionOptions::new().logger(dispatch));
        let query = Query::custom(RecordKind::Transaction, deltalog_core::Filter::all());

        assert!(repo.enumerate_transaction_ids(&query).await.is_empty());
        assert_eq!(repo.enumerate_entity_ids(&query).await.len(), 1);

        let scope = repo.scope_id().to_string();
        let errors = capture.count_events(|e| {
            e.scope_id() == Some(scope.as_str()) && e.event.as_deref() == Some("end_error")
        });
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_logged_error_names_operation_and_scope() {
        let (dispatch, capture) = TestCaptureLayer::dispatch();
        let repo = ResilientRepository::new(Unavailable, SessionOptions::new().logger(dispatch));
        let query = Query::custom(RecordKind::Transaction, deltalog_core::Filter::all());

        repo.enumerate_transaction_ids(&query).await;

        let scope = repo.scope_id().to_string();
        let events = capture.events_for_scope(&scope);
        assert_eq!(events.len(), 1);
        let message = events[0].field("err.message").unwrap();
        assert!(message.starts_with("[ERR_PERSISTENCE] in operation 'enumerate_transaction_ids'"));
        assert!(message.contains(&format!("(scope_id: {})", scope)));
    }
}
