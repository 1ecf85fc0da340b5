//! Local identifier store.
//!
//! A single SQLite table remembers which Jira ticket was opened for which
//! identifier:
//!
//! ```sql
//! CREATE TABLE jira(identifier TEXT PRIMARY KEY, jira_key TEXT)
//! ```
//!
//! There is no schema versioning and rows are never deleted. The store is
//! opened once per invocation and is not safe for concurrent writers.

use crate::Result;
use crate::models::IdentifierRecord;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};

/// Default database file name, relative to the working directory.
pub const DEFAULT_DB_FILE: &str = "jtrack.db";

/// Identifier → ticket key mappings backed by SQLite.
pub struct IdentifierStore {
    /// Location of the database file (":memory:" for in-memory stores)
    path: PathBuf,
    conn: Connection,
}

impl IdentifierStore {
    /// Open the store at `path`, creating the file and table on first use.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            path: path.to_path_buf(),
            conn,
        };
        store.ensure_initialized()?;
        tracing::debug!(path = %path.display(), "opened identifier store");
        Ok(store)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            path: PathBuf::from(":memory:"),
            conn: Connection::open_in_memory()?,
        };
        store.ensure_initialized()?;
        Ok(store)
    }

    /// Create the mapping table if it does not exist yet.
    pub fn ensure_initialized(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jira(identifier TEXT PRIMARY KEY, jira_key TEXT);",
        )?;
        Ok(())
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the ticket key stored for `identifier`.
    ///
    /// Storage faults are returned as errors so the caller can decide whether
    /// to treat them as "not found". A row with a NULL key counts as absent.
    pub fn lookup(&self, identifier: &str) -> rusqlite::Result<Option<String>> {
        let key: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT jira_key FROM jira WHERE identifier = ?1",
                [identifier],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key.flatten())
    }

    /// Point `identifier` at `ticket_key`, overwriting any previous key.
    pub fn upsert(&self, identifier: &str, ticket_key: &str) -> rusqlite::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE jira SET jira_key = ?1 WHERE identifier = ?2",
            params![ticket_key, identifier],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO jira(identifier, jira_key) VALUES (?1, ?2)",
            params![identifier, ticket_key],
        )?;
        tx.commit()
    }

    /// All stored mappings, ordered by identifier.
    pub fn list(&self) -> Result<Vec<IdentifierRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, jira_key FROM jira WHERE jira_key IS NOT NULL ORDER BY identifier",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(IdentifierRecord {
                    identifier: row.get(0)?,
                    ticket_key: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Number of stored mappings.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jira WHERE jira_key IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
