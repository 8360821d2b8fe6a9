//! Open the job store database.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::utils::config::PollConsts;

use super::{SCHEMA, WAL_PRAGMAS};

/// Enable WAL and apply schema to an open connection (idempotent).
fn apply_wal_and_schema(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(())
}

/// Open or create the job store DB and ensure schema + WAL.
/// Other handlers may hold the write lock briefly, so writes wait up to the busy timeout.
pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open job database {}", path.display()))?;
    conn.busy_timeout(PollConsts::DB_BUSY_TIMEOUT)
        .context("set busy timeout")?;
    apply_wal_and_schema(&conn)?;
    Ok(conn)
}

/// Open an in-memory DB with the same schema (tests and embedding; no WAL pragmas needed).
pub fn open_db_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory database")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(conn)
}
