//! SQLite connection management for a Notable workspace file.

use crate::{NotableError, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// Tables every Notable database must contain before it can be opened.
const REQUIRED_TABLES: [&str; 6] = [
    "notes",
    "tags",
    "note_tags",
    "note_contents",
    "operations",
    "workspace_meta",
];

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        prepare_connection(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    /// Opens a private, non-persistent database. Used by tests and callers
    /// that only need a scratch workspace.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Validate database structure
        let placeholders = REQUIRED_TABLES.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let table_count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ({placeholders})"
            ),
            rusqlite::params_from_iter(REQUIRED_TABLES.iter()),
            |row| row.get(0),
        )?;

        if table_count != REQUIRED_TABLES.len() as i64 {
            return Err(NotableError::InvalidWorkspace(
                "Not a valid Notable database".to_string(),
            ));
        }

        prepare_connection(&conn)?;

        // Migrate: soft delete marker on content versions
        let column_exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('note_contents') WHERE name='deleted_at'",
            [],
            |row| row.get::<_, i64>(0).map(|count| count > 0),
        )?;

        if !column_exists {
            log::info!("Migrating note_contents: adding deleted_at column");
            conn.execute("ALTER TABLE note_contents ADD COLUMN deleted_at INTEGER", [])?;
        }

        // Migrate: asset references table
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                storage_key TEXT NOT NULL,
                mime TEXT,
                size INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_assets_note ON assets(note_id);",
        )?;

        Ok(Self { conn })
    }

    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts a write transaction that holds the database write lock from its
    /// first statement, so read-then-write sequences inside it cannot
    /// interleave with another writer.
    pub fn begin_write(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

fn prepare_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}
