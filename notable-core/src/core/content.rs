//! Versioned note content.
//!
//! Each note owns an append-only chain of versions numbered `1, 2, 3, …`.
//! A version carries a rich-text document, derived plain text, or both.
//! Versions are soft-deleted by stamping `deleted_at`, never removed.

use crate::core::render::render_document;
use crate::core::workspace::{ensure_note_exists, now_millis};
use crate::{NotableError, Operation, Result, Workspace};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in a note's content history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentVersion {
    pub note_id: String,
    /// Starts at 1 and increases by one per append.
    pub version: i64,
    pub document: Option<Value>,
    pub text: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set when the version is soft-deleted.
    pub deleted_at: Option<i64>,
}

impl ContentVersion {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

const VERSION_COLUMNS: &str =
    "note_id, version, document_json, text, created_at, updated_at, deleted_at";

type VersionRow = (String, i64, Option<String>, Option<String>, i64, i64, Option<i64>);

fn map_version_row(row: &rusqlite::Row) -> rusqlite::Result<VersionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn version_from_row(
    (note_id, version, document_json, text, created_at, updated_at, deleted_at): VersionRow,
) -> Result<ContentVersion> {
    let document = match document_json {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };
    Ok(ContentVersion {
        note_id,
        version,
        document,
        text,
        created_at,
        updated_at,
        deleted_at,
    })
}

fn fetch_version(conn: &Connection, note_id: &str, version: i64) -> Result<Option<ContentVersion>> {
    conn.query_row(
        &format!("SELECT {VERSION_COLUMNS} FROM note_contents WHERE note_id = ?1 AND version = ?2"),
        rusqlite::params![note_id, version],
        map_version_row,
    )
    .optional()?
    .map(version_from_row)
    .transpose()
}

fn version_not_found(note_id: &str, version: i64) -> NotableError {
    NotableError::NotFound(format!("version {version} of note {note_id}"))
}

impl Workspace {
    /// Appends a new content version to a note.
    ///
    /// When only `document` is supplied, `text` is derived from it with
    /// [`render_document`]. The version number is computed under the write
    /// lock, so concurrent appends to one note never collide.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::InvalidOperation`] if neither `document` nor
    /// `text` is supplied, or [`NotableError::NotFound`] if the note does not exist.
    pub fn append_version(
        &mut self,
        note_id: &str,
        document: Option<Value>,
        text: Option<String>,
    ) -> Result<ContentVersion> {
        if document.is_none() && text.is_none() {
            return Err(NotableError::InvalidOperation(
                "A content version needs a document or text".to_string(),
            ));
        }
        let text = text.or_else(|| document.as_ref().map(render_document));
        let document_json = document.as_ref().map(serde_json::to_string).transpose()?;

        let now = now_millis();
        let tx = self.storage.begin_write()?;
        ensure_note_exists(&tx, note_id)?;

        let version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM note_contents WHERE note_id = ?",
            [note_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO note_contents (note_id, version, document_json, text, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            rusqlite::params![note_id, version, document_json, text, now, now],
        )?;
        tx.execute(
            "UPDATE notes SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, note_id],
        )?;
        self.operation_log.record(
            &tx,
            &Operation::AppendVersion { note_id: note_id.to_string(), version },
        )?;
        tx.commit()?;

        log::debug!("Appended version {version} to note {note_id}");
        Ok(ContentVersion {
            note_id: note_id.to_string(),
            version,
            document,
            text,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Returns the highest-numbered version of a note, skipping soft-deleted
    /// versions unless `include_deleted` is set.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the note does not exist or has
    /// no version passing the filter.
    pub fn latest_version(&self, note_id: &str, include_deleted: bool) -> Result<ContentVersion> {
        let conn = self.connection();
        ensure_note_exists(conn, note_id)?;
        conn.query_row(
            &format!(
                "SELECT {VERSION_COLUMNS} FROM note_contents
                 WHERE note_id = ?1 AND (?2 OR deleted_at IS NULL)
                 ORDER BY version DESC LIMIT 1"
            ),
            rusqlite::params![note_id, include_deleted],
            map_version_row,
        )
        .optional()?
        .map(version_from_row)
        .transpose()?
        .ok_or_else(|| NotableError::NotFound(format!("content of note {note_id}")))
    }

    /// Returns the versions of a note, newest first. Soft-deleted versions
    /// are included only with `include_deleted`.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the note does not exist.
    pub fn version_history(&self, note_id: &str, include_deleted: bool) -> Result<Vec<ContentVersion>> {
        let conn = self.connection();
        ensure_note_exists(conn, note_id)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM note_contents
             WHERE note_id = ?1 AND (?2 OR deleted_at IS NULL)
             ORDER BY version DESC"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![note_id, include_deleted], map_version_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(version_from_row).collect()
    }

    pub fn get_version(&self, note_id: &str, version: i64) -> Result<ContentVersion> {
        fetch_version(self.connection(), note_id, version)?
            .ok_or_else(|| version_not_found(note_id, version))
    }

    /// Marks a version as deleted. Deleting an already-deleted version keeps
    /// its original `deleted_at`.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the version does not exist.
    pub fn soft_delete_version(&mut self, note_id: &str, version: i64) -> Result<ContentVersion> {
        self.set_version_deleted(note_id, version, true)
    }

    /// Clears a version's deletion mark.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the version does not exist.
    pub fn restore_version(&mut self, note_id: &str, version: i64) -> Result<ContentVersion> {
        self.set_version_deleted(note_id, version, false)
    }

    fn set_version_deleted(&mut self, note_id: &str, version: i64, deleted: bool) -> Result<ContentVersion> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let changed = tx.execute(
            "UPDATE note_contents
             SET deleted_at = CASE WHEN ?1 THEN COALESCE(deleted_at, ?2) ELSE NULL END,
                 updated_at = ?2
             WHERE note_id = ?3 AND version = ?4",
            rusqlite::params![deleted, now, note_id, version],
        )?;
        if changed == 0 {
            return Err(version_not_found(note_id, version));
        }
        self.operation_log.record(
            &tx,
            &Operation::SetVersionDeleted { note_id: note_id.to_string(), version, deleted },
        )?;
        let updated = fetch_version(&tx, note_id, version)?
            .ok_or_else(|| version_not_found(note_id, version))?;
        tx.commit()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, NewNote};
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn workspace_with_note() -> (Workspace, String) {
        let mut ws = Workspace::open_in_memory().unwrap();
        let note = ws
            .create_note(NewNote {
                title: "Doc".into(),
                slug: "doc".into(),
                kind: "page".into(),
                ..NewNote::default()
            })
            .unwrap();
        (ws, note.id)
    }

    fn heading_doc(text: &str) -> Value {
        json!({
            "type": "doc",
            "content": [{
                "type": "heading",
                "attrs": {"level": 2},
                "content": [{"type": "text", "text": text, "marks": [{"type": "bold"}]}]
            }]
        })
    }

    #[test]
    fn test_append_numbers_versions_sequentially() {
        let (mut ws, note_id) = workspace_with_note();
        for expected in 1..=3 {
            let v = ws.append_version(&note_id, None, Some(format!("v{expected}"))).unwrap();
            assert_eq!(v.version, expected);
        }
        let latest = ws.latest_version(&note_id, false).unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(latest.text.as_deref(), Some("v3"));
    }

    #[test]
    fn test_append_derives_text_from_document() {
        let (mut ws, note_id) = workspace_with_note();
        let v = ws.append_version(&note_id, Some(heading_doc("Hi")), None).unwrap();
        assert_eq!(v.text.as_deref(), Some("## **Hi**"));

        let stored = ws.get_version(&note_id, 1).unwrap();
        assert_eq!(stored.document, Some(heading_doc("Hi")));
        assert_eq!(stored.text.as_deref(), Some("## **Hi**"));
    }

    #[test]
    fn test_append_keeps_explicit_text() {
        let (mut ws, note_id) = workspace_with_note();
        let v = ws
            .append_version(&note_id, Some(heading_doc("Hi")), Some("custom".into()))
            .unwrap();
        assert_eq!(v.text.as_deref(), Some("custom"));
    }

    #[test]
    fn test_append_requires_payload() {
        let (mut ws, note_id) = workspace_with_note();
        let err = ws.append_version(&note_id, None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_append_to_missing_note() {
        let mut ws = Workspace::open_in_memory().unwrap();
        let err = ws.append_version("missing", None, Some("x".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_append_touches_note() {
        let (mut ws, note_id) = workspace_with_note();
        let before = ws.get_note(&note_id).unwrap().updated_at;
        let v = ws.append_version(&note_id, None, Some("x".into())).unwrap();
        let after = ws.get_note(&note_id).unwrap().updated_at;
        assert!(after >= before);
        assert_eq!(after, v.created_at);
    }

    #[test]
    fn test_latest_version_skips_soft_deleted() {
        let (mut ws, note_id) = workspace_with_note();
        ws.append_version(&note_id, None, Some("one".into())).unwrap();
        ws.append_version(&note_id, None, Some("two".into())).unwrap();
        ws.soft_delete_version(&note_id, 2).unwrap();

        let latest = ws.latest_version(&note_id, false).unwrap();
        assert_eq!(latest.version, 1);
        let latest = ws.latest_version(&note_id, true).unwrap();
        assert_eq!(latest.version, 2);
        assert!(latest.is_deleted());
    }

    #[test]
    fn test_latest_version_not_found_when_empty_or_all_deleted() {
        let (mut ws, note_id) = workspace_with_note();
        let err = ws.latest_version(&note_id, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        ws.append_version(&note_id, None, Some("only".into())).unwrap();
        ws.soft_delete_version(&note_id, 1).unwrap();
        let err = ws.latest_version(&note_id, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(ws.latest_version(&note_id, true).unwrap().version, 1);

        let err = ws.latest_version("missing", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_history_is_newest_first_and_filters_deleted() {
        let (mut ws, note_id) = workspace_with_note();
        for i in 1..=3 {
            ws.append_version(&note_id, None, Some(format!("v{i}"))).unwrap();
        }
        ws.soft_delete_version(&note_id, 2).unwrap();

        let history = ws.version_history(&note_id, true).unwrap();
        let versions: Vec<i64> = history.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
        assert!(history[1].is_deleted());

        let live = ws.version_history(&note_id, false).unwrap();
        let versions: Vec<i64> = live.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![3, 1]);

        let err = ws.version_history("missing", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_soft_delete_is_idempotent_and_restorable() {
        let (mut ws, note_id) = workspace_with_note();
        ws.append_version(&note_id, None, Some("x".into())).unwrap();

        let deleted = ws.soft_delete_version(&note_id, 1).unwrap();
        let first_stamp = deleted.deleted_at.unwrap();
        let again = ws.soft_delete_version(&note_id, 1).unwrap();
        assert_eq!(again.deleted_at, Some(first_stamp));

        let restored = ws.restore_version(&note_id, 1).unwrap();
        assert!(!restored.is_deleted());
        let restored_again = ws.restore_version(&note_id, 1).unwrap();
        assert!(!restored_again.is_deleted());
    }

    #[test]
    fn test_soft_delete_missing_version() {
        let (mut ws, note_id) = workspace_with_note();
        let err = ws.soft_delete_version(&note_id, 7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = ws.restore_version(&note_id, 7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = ws.get_version(&note_id, 7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_deleted_version_numbers_are_not_reused() {
        let (mut ws, note_id) = workspace_with_note();
        ws.append_version(&note_id, None, Some("a".into())).unwrap();
        ws.append_version(&note_id, None, Some("b".into())).unwrap();
        ws.soft_delete_version(&note_id, 2).unwrap();
        let next = ws.append_version(&note_id, None, Some("c".into())).unwrap();
        assert_eq!(next.version, 3);
    }

    #[test]
    fn test_concurrent_appends_produce_unique_versions() {
        let temp = NamedTempFile::new().unwrap();
        let note_id = {
            let mut ws = Workspace::create(temp.path()).unwrap();
            ws.create_note(NewNote {
                title: "Shared".into(),
                slug: "shared".into(),
                kind: "page".into(),
                ..NewNote::default()
            })
            .unwrap()
            .id
        };

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let path = temp.path().to_path_buf();
                let note_id = note_id.clone();
                std::thread::spawn(move || {
                    let mut ws = Workspace::open(&path).unwrap();
                    for i in 0..10 {
                        ws.append_version(&note_id, None, Some(format!("w{worker}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ws = Workspace::open(temp.path()).unwrap();
        let mut versions: Vec<i64> = ws
            .version_history(&note_id, true)
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=40).collect::<Vec<i64>>());
    }
}
