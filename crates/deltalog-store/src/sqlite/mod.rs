//! SQLite backend
//!
//! One [`SqliteHandle`] owns the connection; the repository and any number
//! of snapshot stores share it. Every database call runs on tokio's
//! blocking pool.

mod builders;
mod repository;
mod snapshot;

pub use builders::{SqlFilterBuilder, SqlFragment, SqlSortBuilder};
pub use repository::SqliteRepository;
pub use snapshot::SqliteSnapshotStore;

use deltalog_core::{CommitError, SessionOptions};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db;
use crate::errors::{lock_poisoned, Result};

/// Shared, migrated SQLite connection
#[derive(Clone)]
pub struct SqliteHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHandle {
    /// Open (and migrate) a database file
    ///
    /// # Errors
    ///
    /// Returns a backend error if the file cannot be opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P, options: &SessionOptions) -> Result<Self> {
        Ok(Self::from_connection(db::open(path, options)?))
    }

    /// Open (and migrate) a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns a backend error if migration fails.
    pub fn open_in_memory(options: &SessionOptions) -> Result<Self> {
        Ok(Self::from_connection(db::open_in_memory(options)?))
    }

    /// Wrap a connection that is already configured and migrated
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool
    ///
    /// With a `deadline`, waiting longer than that fails with
    /// [`CommitError::Timeout`].
    pub(crate) async fn run<T, F>(&self, op: &'static str, deadline: Option<Duration>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| lock_poisoned())?;
            f(&mut *conn)
        });

        let joined = match deadline {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| CommitError::Timeout { op: op.to_string() })?,
            None => task.await,
        };

        joined.map_err(|e| CommitError::Backend {
            message: format!("{} task failed: {}", op, e),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalog_core::{ExError, Filter, Query, RecordKind, Repository};

    fn all_transactions() -> Query {
        Query::custom(RecordKind::Transaction, Filter::all())
    }

    #[tokio::test]
    async fn test_read_deadline_times_out_while_connection_is_busy() {
        let options = SessionOptions::new().read_timeout(Duration::from_millis(20));
        let handle = SqliteHandle::open_in_memory(&options).unwrap();
        let repo = SqliteRepository::new(handle.clone(), options);

        // GIVEN a long-running call holding the connection
        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let busy = tokio::spawn({
            let handle = handle.clone();
            async move {
                handle
                    .run("hold_connection", None, move |_conn| {
                        let _ = locked_tx.send(());
                        std::thread::sleep(Duration::from_millis(300));
                        Ok(())
                    })
                    .await
            }
        });
        locked_rx.await.unwrap();

        // WHEN a read with a short deadline is issued
        let err = repo
            .enumerate_transaction_ids(&all_transactions())
            .await
            .unwrap_err();

        // THEN it fails with a timeout carrying the stable code
        assert!(matches!(err, CommitError::Timeout { .. }));
        assert_eq!(ExError::from(err).code(), "ERR_TIMEOUT");

        // AND the handle serves calls again once the busy call finishes
        busy.await.unwrap().unwrap();
        let unhurried = SqliteRepository::new(handle, SessionOptions::default());
        assert!(unhurried
            .enumerate_transaction_ids(&all_transactions())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_call_without_deadline_waits_for_busy_connection() {
        let handle = SqliteHandle::open_in_memory(&SessionOptions::default()).unwrap();

        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let busy = tokio::spawn({
            let handle = handle.clone();
            async move {
                handle
                    .run("hold_connection", None, move |_conn| {
                        let _ = locked_tx.send(());
                        std::thread::sleep(Duration::from_millis(50));
                        Ok(())
                    })
                    .await
            }
        });
        locked_rx.await.unwrap();

        let answer = handle
            .run("read_answer", None, |conn| {
                conn.query_row("SELECT 42", [], |row| row.get::<_, i64>(0))
                    .map_err(crate::errors::from_rusqlite)
            })
            .await
            .unwrap();

        assert_eq!(answer, 42);
        busy.await.unwrap().unwrap();
    }
}
