//! Durable operation log and purge strategies for the Notable workspace.

use crate::{Operation, Result};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Controls which old operations are removed from the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PurgeStrategy {
    /// Retain only the most recent `keep_last` operations.
    KeepLast { keep_last: usize },
    /// Never remove anything.
    KeepAll,
}

impl PurgeStrategy {
    /// `0` means unbounded retention.
    pub fn from_keep_last(keep_last: usize) -> Self {
        if keep_last == 0 {
            Self::KeepAll
        } else {
            Self::KeepLast { keep_last }
        }
    }
}

/// A journal row as returned by [`Workspace::list_operations`](crate::Workspace::list_operations).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub operation_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub operation_type: String,
    pub note_id: Option<String>,
    pub operation: Operation,
}

/// Records workspace mutations to the `operations` table and purges stale entries.
pub struct OperationLog {
    strategy: PurgeStrategy,
}

impl OperationLog {
    /// Creates a new `OperationLog` with the given purge strategy.
    pub fn new(strategy: PurgeStrategy) -> Self {
        Self { strategy }
    }

    /// Serialises `op` and appends it to the `operations` table within `tx`.
    ///
    /// Returns the generated operation ID.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NotableError::Database`] if the INSERT fails, or
    /// [`crate::NotableError::Json`] if `op` cannot be serialised.
    pub fn log(&self, tx: &Transaction, op: &Operation) -> Result<String> {
        let operation_id = Uuid::new_v4().to_string();
        let op_json = serde_json::to_string(op)?;

        tx.execute(
            "INSERT INTO operations (operation_id, timestamp, operation_type, note_id, operation_data)
             VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![
                operation_id,
                chrono::Utc::now().timestamp_millis(),
                op.type_name(),
                op.note_id(),
                op_json,
            ],
        )?;

        Ok(operation_id)
    }

    /// Deletes old operations from the log according to the purge strategy.
    ///
    /// Call this after every [`log`](Self::log) call to keep the table bounded in size.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NotableError::Database`] if the DELETE fails.
    pub fn purge_if_needed(&self, tx: &Transaction) -> Result<()> {
        if let PurgeStrategy::KeepLast { keep_last } = self.strategy {
            let removed = tx.execute(
                "DELETE FROM operations WHERE id NOT IN (
                    SELECT id FROM operations ORDER BY id DESC LIMIT ?
                )",
                [keep_last as i64],
            )?;
            if removed > 0 {
                log::info!("Purged {removed} journal entries");
            }
        }
        Ok(())
    }

    /// Logs `op` and purges in one step; the common case for every mutation.
    pub fn record(&self, tx: &Transaction, op: &Operation) -> Result<()> {
        self.log(tx, op)?;
        self.purge_if_needed(tx)
    }

    /// Returns logged operations newest first, optionally restricted to one note.
    pub fn list(
        conn: &Connection,
        note_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<OperationSummary>> {
        let mut stmt = conn.prepare(
            "SELECT operation_id, timestamp, operation_type, note_id, operation_data
             FROM operations
             WHERE (?1 IS NULL OR note_id = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let limit = limit.map_or(-1, i64::from);
        let rows = stmt
            .query_map(rusqlite::params![note_id, limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(operation_id, timestamp, operation_type, note_id, data)| {
                Ok(OperationSummary {
                    operation_id,
                    timestamp,
                    operation_type,
                    note_id,
                    operation: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }

    /// Returns the most recent operation of `operation_type`, if any.
    pub fn latest_of_type(conn: &Connection, operation_type: &str) -> Result<Option<Operation>> {
        let data: Option<String> = conn
            .query_row(
                "SELECT operation_data FROM operations WHERE operation_type = ?
                 ORDER BY id DESC LIMIT 1",
                [operation_type],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}
