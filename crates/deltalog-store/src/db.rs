//! Database connection management
//!
//! Provides utilities for opening and configuring SQLite connections

use deltalog_core::SessionOptions;
use rusqlite::Connection;
use std::path::Path;

use crate::errors::{from_rusqlite, Result};
use crate::migrations::apply_migrations;

/// Open a SQLite database at the given path and bring its schema up to date
pub fn open<P: AsRef<Path>>(path: P, options: &SessionOptions) -> Result<Connection> {
    let mut conn = Connection::open(path).map_err(from_rusqlite)?;
    apply_migrations(&mut conn)?;
    configure(&conn, options)?;
    Ok(conn)
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory(options: &SessionOptions) -> Result<Connection> {
    let mut conn = Connection::open_in_memory().map_err(from_rusqlite)?;
    apply_migrations(&mut conn)?;
    configure(&conn, options)?;
    Ok(conn)
}

/// Configure a migrated connection for the session
///
/// The longer of the two timeouts becomes SQLite's busy timeout, so a
/// locked database is retried for at most that long.
pub fn configure(conn: &Connection, options: &SessionOptions) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(from_rusqlite)?;

    // In-memory databases report "memory"; that is not an error.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .map_err(from_rusqlite)?;

    if let Some(timeout) = options.write_timeout.max(options.read_timeout) {
        conn.busy_timeout(timeout).map_err(from_rusqlite)?;
    }

    if options.read_only {
        conn.execute_batch("PRAGMA query_only = ON;")
            .map_err(from_rusqlite)?;
    }

    Ok(())
}
