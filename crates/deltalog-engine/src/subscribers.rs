//! Post-commit subscriber dispatch
//!
//! Each registered subscriber receives the committed transaction on its
//! own tokio task. A failing or panicking subscriber is logged from inside
//! its task, whether or not the dispatch handle is awaited, and does not
//! affect the others or the commit itself.

use async_trait::async_trait;
use deltalog_core::{log_op_error, CommitError, ExError, ExErrorKind, SessionOptions, Transaction};
use deltalog_core_types::ScopeId;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

/// Receiver of committed transactions
#[async_trait]
pub trait TransactionSubscriber: Send + Sync {
    /// Name used in log entries
    fn name(&self) -> &str;

    /// Handle one committed transaction
    ///
    /// # Errors
    ///
    /// Any error is logged by the dispatcher; it never reaches the committer.
    async fn notify(&self, transaction: Arc<Transaction>) -> Result<(), CommitError>;
}

/// Registered subscribers, notified in registration order
#[derive(Clone, Default)]
pub struct Subscribers {
    entries: Vec<Arc<dyn TransactionSubscriber>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscriber: Arc<dyn TransactionSubscriber>) {
        self.entries.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start one task per subscriber and return without waiting
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(
        &self,
        transaction: Arc<Transaction>,
        scope_id: ScopeId,
        options: &SessionOptions,
    ) -> DispatchHandle {
        let tasks = self
            .entries
            .iter()
            .map(|subscriber| {
                let subscriber = subscriber.clone();
                let name = subscriber.name().to_string();
                let transaction = transaction.clone();
                let task = async move {
                    let start = Instant::now();
                    let outcome = AssertUnwindSafe(subscriber.notify(transaction.clone()))
                        .catch_unwind()
                        .await;
                    let err = match outcome {
                        Ok(Ok(())) => return true,
                        Ok(Err(err)) => ExError::from(err),
                        Err(panic) => ExError::new(ExErrorKind::Internal).with_message(format!(
                            "subscriber panicked: {}",
                            panic_message(panic.as_ref())
                        )),
                    };
                    log_op_error!(
                        "notify_subscriber",
                        err.with_scope_id(scope_id),
                        duration_ms = start.elapsed().as_millis() as u64,
                        scope_id = %scope_id,
                        subscriber = subscriber.name(),
                        transaction_id = %transaction.id
                    );
                    false
                };
                let handle = match &options.logger {
                    Some(dispatch) => tokio::spawn(task.with_subscriber(dispatch.clone())),
                    None => tokio::spawn(task),
                };
                (name, handle)
            })
            .collect();

        DispatchHandle {
            tasks,
            scope_id,
            options: options.clone(),
        }
    }
}

/// Outcome of one dispatch once every subscriber has finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Joinable handle over the subscriber tasks of one dispatch
///
/// Dropping it detaches the tasks; they still run to completion.
pub struct DispatchHandle {
    tasks: Vec<(String, JoinHandle<bool>)>,
    scope_id: ScopeId,
    options: SessionOptions,
}

impl DispatchHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every subscriber task
    ///
    /// Failures were already logged by the tasks themselves; only a task
    /// that was cancelled is logged here.
    pub async fn wait(self) -> DispatchSummary {
        let (names, handles): (Vec<String>, Vec<JoinHandle<bool>>) = self.tasks.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut summary = DispatchSummary::default();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(true) => summary.delivered += 1,
                Ok(false) => summary.failed += 1,
                Err(join_err) => {
                    summary.failed += 1;
                    let err = ExError::new(ExErrorKind::Internal)
                        .with_message(format!("subscriber task aborted: {}", join_err))
                        .with_scope_id(self.scope_id);
                    crate::resilient::emit_with(&self.options, || {
                        log_op_error!(
                            "notify_subscriber",
                            err,
                            duration_ms = 0u64,
                            scope_id = %self.scope_id,
                            subscriber = name.as_str()
                        );
                    });
                }
            }
        }
        summary
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
