//! High-level workspace operations over a Notable SQLite database.

use crate::core::tag::reconcile_note_tags;
use crate::{
    DeleteResult, NewNote, Note, NoteFilter, NotePage, NoteTreeNode, NoteUpdate, NotableError,
    Operation, OperationLog, OperationSummary, PurgeStrategy, Result, Settings, Storage,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

/// An open Notable workspace backed by a SQLite database.
///
/// `Workspace` is the primary interface for all mutations. Every mutating
/// method runs inside one immediate write transaction: reads that feed a
/// write (sibling order, next version number, tag reconciliation) happen
/// under the database write lock, and any error rolls the whole operation
/// back. Independent handles may be opened on the same file from different
/// threads or processes; a single handle is not shared between threads.
pub struct Workspace {
    pub(crate) storage: Storage,
    pub(crate) operation_log: OperationLog,
    pub(crate) settings: Settings,
}

/// Current Unix time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Column list shared by every note query; expects the `notes` table aliased as `n`.
pub(crate) const NOTE_COLUMNS: &str = "n.id, n.owner_id, n.title, n.slug, n.kind, n.parent_id,
    n.position, n.metadata_json, n.created_at, n.updated_at,
    (SELECT GROUP_CONCAT(t.slug, char(31)) FROM note_tags nt JOIN tags t ON t.id = nt.tag_id
     WHERE nt.note_id = n.id) AS tags";

/// Canonical sibling ordering.
pub(crate) const NOTE_ORDER: &str = "n.position, n.created_at, n.rowid";

impl Workspace {
    /// Creates a new workspace database at `path` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::Database`] for any SQLite failure.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_settings(path, Settings::default())
    }

    /// Creates a new workspace database at `path` and initialises the schema.
    pub fn create_with_settings<P: AsRef<Path>>(path: P, settings: Settings) -> Result<Self> {
        let storage = Storage::create(&path)?;
        let now = now_millis().to_string();
        storage.connection().execute(
            "INSERT OR REPLACE INTO workspace_meta (key, value) VALUES ('created_at', ?)",
            [&now],
        )?;
        log::info!("Created workspace at {}", path.as_ref().display());
        Self::from_storage(storage, settings)
    }

    /// Opens an existing workspace database at `path` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::InvalidWorkspace`] if the file is not a Notable
    /// database, or [`NotableError::Database`] for any SQLite failure.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_settings(path, Settings::default())
    }

    pub fn open_with_settings<P: AsRef<Path>>(path: P, settings: Settings) -> Result<Self> {
        let storage = Storage::open(&path)?;
        log::info!("Opened workspace at {}", path.as_ref().display());
        Self::from_storage(storage, settings)
    }

    /// Opens a throwaway workspace that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_storage(Storage::open_in_memory()?, Settings::default())
    }

    fn from_storage(storage: Storage, settings: Settings) -> Result<Self> {
        storage.set_busy_timeout(settings.busy_timeout())?;
        Ok(Self {
            storage,
            operation_log: OperationLog::new(PurgeStrategy::from_keep_last(
                settings.journal_keep_last,
            )),
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        self.storage.connection()
    }

    /// Fetches a single note by ID, including its tag slugs.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the note does not exist.
    pub fn get_note(&self, note_id: &str) -> Result<Note> {
        fetch_note(self.connection(), note_id)
    }

    /// Creates a note appended at the end of its sibling group.
    ///
    /// Initial tags are reconciled in the same transaction, so a failure at
    /// any step leaves no note behind.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if `parent_id` does not exist,
    /// [`NotableError::Conflict`] if the slug is taken, or
    /// [`NotableError::InvalidOperation`] if the slug is blank.
    pub fn create_note(&mut self, new: NewNote) -> Result<Note> {
        let slug = new.slug.trim().to_string();
        if slug.is_empty() {
            return Err(NotableError::InvalidOperation(
                "Note slug must not be empty".to_string(),
            ));
        }

        let now = now_millis();
        let note_id = Uuid::new_v4().to_string();
        let tx = self.storage.begin_write()?;

        if let Some(parent_id) = &new.parent_id {
            ensure_note_exists(&tx, parent_id)?;
        }
        ensure_slug_available(&tx, &slug, None)?;

        let position: i64 = tx.query_row(
            "SELECT COUNT(*) FROM notes WHERE parent_id IS ?",
            [&new.parent_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO notes (id, owner_id, title, slug, kind, parent_id, position, metadata_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                note_id,
                new.owner,
                new.title,
                slug,
                new.kind,
                new.parent_id,
                position,
                serde_json::to_string(&new.metadata)?,
                now,
                now,
            ],
        )?;

        self.operation_log.record(
            &tx,
            &Operation::CreateNote {
                note_id: note_id.clone(),
                owner: new.owner.clone(),
                parent_id: new.parent_id.clone(),
                position,
                slug,
                kind: new.kind.clone(),
            },
        )?;

        if !new.tags.is_empty() {
            let tags = reconcile_note_tags(
                &tx,
                &self.operation_log,
                &note_id,
                new.owner.as_deref(),
                &new.tags,
                now,
            )?;
            self.operation_log.record(
                &tx,
                &Operation::SetNoteTags { note_id: note_id.clone(), tags },
            )?;
        }

        let note = fetch_note(&tx, &note_id)?;
        tx.commit()?;

        log::debug!("Created note {} at position {} under {:?}", note.id, note.position, note.parent_id);
        Ok(note)
    }

    /// Applies the supplied fields of `update` to a note.
    ///
    /// A parent change moves the note to the end of the new sibling group and
    /// closes the gap it leaves behind. An owner change detaches every tag
    /// scoped to a different user. A tag list replaces the note's tag set.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] for a missing note or parent,
    /// [`NotableError::InvalidOperation`] if the new parent is the note itself
    /// or one of its descendants, and [`NotableError::Conflict`] for a taken slug.
    pub fn update_note(&mut self, note_id: &str, update: NoteUpdate) -> Result<Note> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let current = fetch_note(&tx, note_id)?;
        let mut changed: Vec<String> = Vec::new();

        if let Some(new_parent) = update.parent_id {
            if new_parent != current.parent_id {
                if let Some(parent_id) = &new_parent {
                    ensure_note_exists(&tx, parent_id)?;
                    ensure_not_descendant(&tx, note_id, parent_id)?;
                }
                reparent_to_end(&tx, note_id, current.parent_id.as_deref(), new_parent.as_deref(), now)?;
                changed.push("parentId".to_string());
            }
        }

        let slug = match update.slug {
            Some(slug) if slug.trim() != current.slug => {
                let slug = slug.trim().to_string();
                if slug.is_empty() {
                    return Err(NotableError::InvalidOperation(
                        "Note slug must not be empty".to_string(),
                    ));
                }
                ensure_slug_available(&tx, &slug, Some(note_id))?;
                changed.push("slug".to_string());
                slug
            }
            _ => current.slug.clone(),
        };

        let title = match update.title {
            Some(title) => {
                changed.push("title".to_string());
                title
            }
            None => current.title.clone(),
        };
        let kind = match update.kind {
            Some(kind) => {
                changed.push("kind".to_string());
                kind
            }
            None => current.kind.clone(),
        };
        let metadata = match update.metadata {
            Some(metadata) => {
                changed.push("metadata".to_string());
                metadata
            }
            None => current.metadata.clone(),
        };

        let owner = match update.owner {
            Some(owner) if owner != current.owner => {
                let detached = tx.execute(
                    "DELETE FROM note_tags WHERE note_id = ?1 AND tag_id IN (
                        SELECT id FROM tags WHERE owner_id IS NOT NULL AND owner_id IS NOT ?2
                    )",
                    rusqlite::params![note_id, owner],
                )?;
                if detached > 0 {
                    log::debug!("Detached {detached} out-of-scope tags from note {note_id}");
                }
                changed.push("owner".to_string());
                owner
            }
            _ => current.owner.clone(),
        };

        tx.execute(
            "UPDATE notes SET title = ?1, slug = ?2, kind = ?3, metadata_json = ?4, owner_id = ?5, updated_at = ?6
             WHERE id = ?7",
            rusqlite::params![
                title,
                slug,
                kind,
                serde_json::to_string(&metadata)?,
                owner,
                now,
                note_id,
            ],
        )?;

        if let Some(wanted) = update.tags {
            let tags = reconcile_note_tags(
                &tx,
                &self.operation_log,
                note_id,
                owner.as_deref(),
                &wanted,
                now,
            )?;
            self.operation_log.record(
                &tx,
                &Operation::SetNoteTags { note_id: note_id.to_string(), tags },
            )?;
        }

        if !changed.is_empty() {
            self.operation_log.record(
                &tx,
                &Operation::UpdateNote { note_id: note_id.to_string(), fields: changed },
            )?;
        }

        let note = fetch_note(&tx, note_id)?;
        tx.commit()?;

        log::debug!("Updated note {note_id}");
        Ok(note)
    }

    /// Moves a note under `new_parent_id` (or to root level) at `position`.
    ///
    /// The target sibling group is renumbered in full: the note is removed
    /// from the ordered list, inserted at `position` clamped to
    /// `[0, sibling_count]` (appended when `None`), and every member gets its
    /// list index as position. The former group is renumbered as well when
    /// the parent changes.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::InvalidOperation`] if the move would make a note
    /// its own parent or create an ancestor cycle. Returns
    /// [`NotableError::NotFound`] if the note or the new parent does not exist.
    pub fn move_note(
        &mut self,
        note_id: &str,
        new_parent_id: Option<&str>,
        position: Option<i64>,
    ) -> Result<Note> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let note = fetch_note(&tx, note_id)?;

        if let Some(parent_id) = new_parent_id {
            ensure_note_exists(&tx, parent_id)?;
            ensure_not_descendant(&tx, note_id, parent_id)?;
        }

        let old_parent_id = note.parent_id.as_deref();
        if old_parent_id != new_parent_id {
            tx.execute(
                "UPDATE notes SET parent_id = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![new_parent_id, now, note_id],
            )?;
        }

        let new_position = place_in_group(&tx, note_id, new_parent_id, position, now)?;

        if old_parent_id != new_parent_id {
            let old_siblings = sibling_ids(&tx, old_parent_id, None)?;
            renumber(&tx, &old_siblings, now)?;
        }

        self.operation_log.record(
            &tx,
            &Operation::MoveNote {
                note_id: note_id.to_string(),
                new_parent_id: new_parent_id.map(str::to_string),
                new_position,
            },
        )?;

        let moved = fetch_note(&tx, note_id)?;
        tx.commit()?;

        log::debug!("Moved note {note_id} to position {new_position} under {new_parent_id:?}");
        Ok(moved)
    }

    /// Deletes a note with its content versions, tag associations and asset
    /// references.
    ///
    /// Direct children become roots, appended after the existing roots in
    /// their previous relative order. Both the root group and the deleted
    /// note's former group are renumbered so positions stay contiguous.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if no note with `note_id` exists.
    pub fn delete_note(&mut self, note_id: &str) -> Result<DeleteResult> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let note = fetch_note(&tx, note_id)?;

        let children = sibling_ids(&tx, Some(note_id), None)?;
        let mut roots = sibling_ids(&tx, None, Some(note_id))?;

        tx.execute(
            "UPDATE notes SET parent_id = NULL, updated_at = ?1 WHERE parent_id = ?2",
            rusqlite::params![now, note_id],
        )?;
        roots.extend(children.iter().cloned());
        renumber(&tx, &roots, now)?;

        if let Some(parent_id) = note.parent_id.as_deref() {
            let siblings = sibling_ids(&tx, Some(parent_id), Some(note_id))?;
            renumber(&tx, &siblings, now)?;
        }

        // Content versions, tag links and assets cascade via foreign keys.
        tx.execute("DELETE FROM notes WHERE id = ?1", [note_id])?;

        self.operation_log.record(
            &tx,
            &Operation::DeleteNote {
                note_id: note_id.to_string(),
                reparented_ids: children.clone(),
            },
        )?;
        tx.commit()?;

        log::debug!("Deleted note {note_id}, re-rooted {} children", children.len());
        Ok(DeleteResult {
            deleted_id: note_id.to_string(),
            reparented_ids: children,
        })
    }

    /// Returns the direct children of `parent_id` (or the root-level notes
    /// when `None`), ordered by position.
    pub fn get_children(&self, parent_id: Option<&str>) -> Result<Vec<Note>> {
        query_notes(
            self.connection(),
            &format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.parent_id IS ?1 ORDER BY {NOTE_ORDER}"),
            vec![parent_id.map_or(SqlValue::Null, |p| SqlValue::Text(p.to_string()))],
        )
    }

    /// Returns the number of direct children of `note_id`.
    pub fn count_children(&self, note_id: &str) -> Result<usize> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM notes WHERE parent_id = ?1",
            [note_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Returns one page of notes matching `filter`, ordered by
    /// `(position, created_at)`. `limit` is clamped by the workspace settings.
    pub fn list_notes(
        &self,
        filter: &NoteFilter,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<NotePage> {
        let (condition, params) = filter.to_sql();
        let mut params: Vec<SqlValue> = params.into_iter().map(SqlValue::Text).collect();

        let total: i64 = self.connection().query_row(
            &format!("SELECT COUNT(*) FROM notes n WHERE {condition}"),
            rusqlite::params_from_iter(params.iter()),
            |row| row.get(0),
        )?;

        params.push(SqlValue::Integer(i64::from(self.settings.page_limit(limit))));
        params.push(SqlValue::Integer(i64::from(offset)));
        let items = query_notes(
            self.connection(),
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes n WHERE {condition}
                 ORDER BY {NOTE_ORDER} LIMIT ? OFFSET ?"
            ),
            params,
        )?;

        Ok(NotePage {
            total: total as u64,
            items,
        })
    }

    /// Returns the forest of notes matching `filter`.
    ///
    /// A matching note whose parent did not match (or does not exist) is a
    /// root of the returned forest.
    pub fn note_tree(&self, filter: &NoteFilter) -> Result<Vec<NoteTreeNode>> {
        let (condition, params) = filter.to_sql();
        let notes = query_notes(
            self.connection(),
            &format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE {condition} ORDER BY {NOTE_ORDER}"),
            params.into_iter().map(SqlValue::Text).collect(),
        )?;
        Ok(build_forest(notes))
    }

    /// Returns journal entries newest first, optionally for one note only.
    pub fn list_operations(
        &self,
        note_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<OperationSummary>> {
        OperationLog::list(self.connection(), note_id, limit)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

/// Raw 11-column tuple extracted by [`NOTE_COLUMNS`].
type NoteRow = (
    String,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
    i64,
    String,
    i64,
    i64,
    Option<String>,
);

fn map_note_row(row: &rusqlite::Row) -> rusqlite::Result<NoteRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

/// Converts a raw row into a [`Note`], parsing `metadata_json` and the
/// unit-separator-delimited tag slugs.
fn note_from_row_tuple(
    (id, owner, title, slug, kind, parent_id, position, metadata_json, created_at, updated_at, tags_joined): NoteRow,
) -> Result<Note> {
    let mut tags: Vec<String> = tags_joined
        .unwrap_or_default()
        .split('\u{1f}')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    tags.sort();
    Ok(Note {
        id,
        owner,
        title,
        slug,
        kind,
        parent_id,
        position,
        metadata: serde_json::from_str(&metadata_json)?,
        tags,
        created_at,
        updated_at,
    })
}

pub(crate) fn query_notes(conn: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), map_note_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(note_from_row_tuple).collect()
}

pub(crate) fn fetch_note(conn: &Connection, note_id: &str) -> Result<Note> {
    let row = conn
        .query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = ?"),
            [note_id],
            map_note_row,
        )
        .optional()?
        .ok_or_else(|| NotableError::note_not_found(note_id))?;
    note_from_row_tuple(row)
}

// ── Hierarchy helpers (run inside the caller's transaction) ─────────────────

pub(crate) fn ensure_note_exists(conn: &Connection, note_id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?)",
        [note_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(NotableError::note_not_found(note_id))
    }
}

fn ensure_slug_available(conn: &Connection, slug: &str, except_id: Option<&str>) -> Result<()> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM notes WHERE slug = ?1 AND (?2 IS NULL OR id != ?2))",
        rusqlite::params![slug, except_id],
        |row| row.get(0),
    )?;
    if taken {
        Err(NotableError::Conflict(format!("Note slug '{slug}' is already in use")))
    } else {
        Ok(())
    }
}

/// Fails if `candidate_parent` is `note_id` itself or one of its descendants,
/// by walking the candidate's ancestor chain.
fn ensure_not_descendant(conn: &Connection, note_id: &str, candidate_parent: &str) -> Result<()> {
    let mut seen = HashSet::new();
    let mut current = Some(candidate_parent.to_string());
    while let Some(id) = current {
        if id == note_id {
            return Err(NotableError::InvalidOperation(
                "Cannot move a note into itself or its own descendant".to_string(),
            ));
        }
        if !seen.insert(id.clone()) {
            break;
        }
        current = conn
            .query_row("SELECT parent_id FROM notes WHERE id = ?", [&id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();
    }
    Ok(())
}

/// IDs of the notes under `parent_id` in sibling order, optionally leaving one out.
fn sibling_ids(conn: &Connection, parent_id: Option<&str>, exclude: Option<&str>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT n.id FROM notes n WHERE n.parent_id IS ?1 AND (?2 IS NULL OR n.id != ?2)
         ORDER BY {NOTE_ORDER}"
    ))?;
    let ids = stmt
        .query_map(rusqlite::params![parent_id, exclude], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Assigns each listed note its index as position. Only rows whose position
/// actually changes get a fresh `updated_at`.
fn renumber(conn: &Connection, ordered_ids: &[String], now: i64) -> Result<()> {
    let mut stmt = conn.prepare(
        "UPDATE notes SET position = ?1, updated_at = ?2 WHERE id = ?3 AND position != ?1",
    )?;
    for (position, id) in ordered_ids.iter().enumerate() {
        stmt.execute(rusqlite::params![position as i64, now, id])?;
    }
    Ok(())
}

/// Inserts `note_id` into the sibling group of `parent_id` at the clamped
/// `position` and renumbers the group. The note's `parent_id` must already
/// be set. Returns the final position.
fn place_in_group(
    conn: &Connection,
    note_id: &str,
    parent_id: Option<&str>,
    position: Option<i64>,
    now: i64,
) -> Result<i64> {
    let mut ids = sibling_ids(conn, parent_id, Some(note_id))?;
    let index = position.map_or(ids.len(), |p| p.clamp(0, ids.len() as i64) as usize);
    ids.insert(index, note_id.to_string());
    renumber(conn, &ids, now)?;
    Ok(index as i64)
}

fn reparent_to_end(
    conn: &Connection,
    note_id: &str,
    old_parent_id: Option<&str>,
    new_parent_id: Option<&str>,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE notes SET parent_id = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![new_parent_id, now, note_id],
    )?;
    place_in_group(conn, note_id, new_parent_id, None, now)?;
    let old_siblings = sibling_ids(conn, old_parent_id, None)?;
    renumber(conn, &old_siblings, now)
}

/// Groups already-ordered notes by parent; notes whose parent is not in the
/// set become roots.
fn build_forest(notes: Vec<Note>) -> Vec<NoteTreeNode> {
    let ids: HashSet<String> = notes.iter().map(|n| n.id.clone()).collect();
    let mut children_of: HashMap<String, Vec<Note>> = HashMap::new();
    let mut roots = Vec::new();

    for note in notes {
        match note.parent_id.clone().filter(|p| ids.contains(p)) {
            Some(parent_id) => children_of.entry(parent_id).or_default().push(note),
            None => roots.push(note),
        }
    }

    roots
        .into_iter()
        .map(|root| attach_children(root, &mut children_of))
        .collect()
}

fn attach_children(note: Note, children_of: &mut HashMap<String, Vec<Note>>) -> NoteTreeNode {
    let children = children_of
        .remove(&note.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach_children(child, children_of))
        .collect();
    NoteTreeNode { note, children }
}
