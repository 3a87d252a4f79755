//! Opaque blob references attached to notes.

use crate::core::workspace::{ensure_note_exists, now_millis};
use crate::{NotableError, Operation, Result, Workspace};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reference to externally stored binary data. The blob itself never
/// enters the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub note_id: String,
    pub storage_key: String,
    pub mime: Option<String>,
    /// Size in bytes, when known.
    pub size: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn map_asset_row(row: &rusqlite::Row) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: row.get(0)?,
        note_id: row.get(1)?,
        storage_key: row.get(2)?,
        mime: row.get(3)?,
        size: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Workspace {
    /// Records a blob reference on a note.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the note does not exist, or
    /// [`NotableError::InvalidOperation`] for a blank key or negative size.
    pub fn add_asset(
        &mut self,
        note_id: &str,
        storage_key: &str,
        mime: Option<&str>,
        size: Option<i64>,
    ) -> Result<Asset> {
        let storage_key = storage_key.trim();
        if storage_key.is_empty() {
            return Err(NotableError::InvalidOperation(
                "Asset storage key must not be empty".to_string(),
            ));
        }
        if size.is_some_and(|s| s < 0) {
            return Err(NotableError::InvalidOperation(
                "Asset size must not be negative".to_string(),
            ));
        }

        let now = now_millis();
        let asset = Asset {
            id: Uuid::new_v4().to_string(),
            note_id: note_id.to_string(),
            storage_key: storage_key.to_string(),
            mime: mime.map(str::to_string),
            size,
            created_at: now,
            updated_at: now,
        };

        let tx = self.storage.begin_write()?;
        ensure_note_exists(&tx, note_id)?;
        tx.execute(
            "INSERT INTO assets (id, note_id, storage_key, mime, size, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                asset.id,
                asset.note_id,
                asset.storage_key,
                asset.mime,
                asset.size,
                now,
                now,
            ],
        )?;
        self.operation_log.record(
            &tx,
            &Operation::AddAsset {
                note_id: asset.note_id.clone(),
                asset_id: asset.id.clone(),
                storage_key: asset.storage_key.clone(),
            },
        )?;
        tx.commit()?;
        Ok(asset)
    }

    /// Lists a note's assets, oldest first.
    pub fn list_assets(&self, note_id: &str) -> Result<Vec<Asset>> {
        let conn = self.connection();
        ensure_note_exists(conn, note_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, note_id, storage_key, mime, size, created_at, updated_at
             FROM assets WHERE note_id = ? ORDER BY created_at, rowid",
        )?;
        let assets = stmt
            .query_map([note_id], map_asset_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assets)
    }

    /// Removes a blob reference.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if no asset has `asset_id`.
    pub fn remove_asset(&mut self, asset_id: &str) -> Result<()> {
        let tx = self.storage.begin_write()?;
        let note_id: String = tx
            .query_row("SELECT note_id FROM assets WHERE id = ?", [asset_id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| NotableError::NotFound(format!("asset {asset_id}")))?;
        tx.execute("DELETE FROM assets WHERE id = ?", [asset_id])?;
        self.operation_log.record(
            &tx,
            &Operation::RemoveAsset { note_id, asset_id: asset_id.to_string() },
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, NewNote};

    fn workspace_with_note() -> (Workspace, String) {
        let mut ws = Workspace::open_in_memory().unwrap();
        let note = ws
            .create_note(NewNote {
                title: "Files".into(),
                slug: "files".into(),
                kind: "page".into(),
                ..NewNote::default()
            })
            .unwrap();
        (ws, note.id)
    }

    #[test]
    fn test_add_and_list_assets() {
        let (mut ws, note_id) = workspace_with_note();
        let first = ws.add_asset(&note_id, "blobs/one.png", Some("image/png"), Some(1024)).unwrap();
        let second = ws.add_asset(&note_id, " blobs/two.bin ", None, None).unwrap();
        assert_eq!(second.storage_key, "blobs/two.bin");

        let assets = ws.list_assets(&note_id).unwrap();
        assert_eq!(assets, vec![first, second]);
    }

    #[test]
    fn test_add_asset_validation() {
        let (mut ws, note_id) = workspace_with_note();
        let err = ws.add_asset(&note_id, "  ", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let err = ws.add_asset(&note_id, "k", None, Some(-1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let err = ws.add_asset("missing", "k", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(ws.list_assets(&note_id).unwrap().is_empty());
    }

    #[test]
    fn test_remove_asset() {
        let (mut ws, note_id) = workspace_with_note();
        let asset = ws.add_asset(&note_id, "k", None, None).unwrap();
        ws.remove_asset(&asset.id).unwrap();
        assert!(ws.list_assets(&note_id).unwrap().is_empty());

        let err = ws.remove_asset(&asset.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let ops = ws.list_operations(Some(&note_id), Some(1)).unwrap();
        assert_eq!(ops[0].operation_type, "RemoveAsset");
    }

    #[test]
    fn test_list_assets_missing_note() {
        let ws = Workspace::open_in_memory().unwrap();
        assert_eq!(ws.list_assets("missing").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
