//! Global and per-user tags, and the note/tag association.
//!
//! A tag with no owner is global and may be attached to any note. A tag with
//! an owner may only be attached to notes of that same owner.

use crate::core::workspace::{fetch_note, now_millis, query_notes, NOTE_COLUMNS, NOTE_ORDER};
use crate::{NotableError, Note, Operation, OperationLog, Result, Workspace};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    /// Owning user, or `None` for a global tag.
    pub owner: Option<String>,
    pub name: String,
    pub slug: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Tag {
    pub fn is_global(&self) -> bool {
        self.owner.is_none()
    }

    /// Whether this tag may be attached to a note owned by `note_owner`.
    pub fn fits_scope(&self, note_owner: Option<&str>) -> bool {
        match self.owner.as_deref() {
            None => true,
            Some(owner) => Some(owner) == note_owner,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPage {
    pub total: u64,
    pub items: Vec<Tag>,
}

static SLUG_SEPARATOR: OnceLock<Regex> = OnceLock::new();

fn slug_separator() -> &'static Regex {
    SLUG_SEPARATOR.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("slug separator pattern is valid"))
}

/// Lowercases `input` and collapses every run of characters outside
/// `[a-z0-9]` into a single `-`, trimming leading and trailing dashes.
///
/// Falls back to `input` unchanged when nothing slug-worthy remains.
///
/// ```rust
/// use notable_core::slugify;
///
/// assert_eq!(slugify("Hello, World!"), "hello-world");
/// assert_eq!(slugify("!!!"), "!!!");
/// ```
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let slug = slug_separator().replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        input.to_string()
    } else {
        slug.to_string()
    }
}

/// Trims each requested tag slug, drops blanks and duplicates, and returns
/// the remainder sorted.
pub fn normalize_tag_slugs(requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ── Row mapping ──────────────────────────────────────────────────────────────

const TAG_COLUMNS: &str = "id, owner_id, name, slug, created_at, updated_at";

fn map_tag_row(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn fetch_tag(conn: &Connection, tag_id: &str) -> Result<Tag> {
    conn.query_row(
        &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?"),
        [tag_id],
        map_tag_row,
    )
    .optional()?
    .ok_or_else(|| NotableError::tag_not_found(tag_id))
}

/// Fails with `Conflict` if another tag in `owner`'s scope already uses
/// `name` or `slug`.
fn ensure_tag_unique(
    conn: &Connection,
    owner: Option<&str>,
    name: &str,
    slug: &str,
    except_id: Option<&str>,
) -> Result<()> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tags
         WHERE owner_id IS ?1 AND (name = ?2 OR slug = ?3) AND (?4 IS NULL OR id != ?4))",
        rusqlite::params![owner, name, slug, except_id],
        |row| row.get(0),
    )?;
    if taken {
        Err(NotableError::Conflict(format!(
            "A tag named '{name}' or with slug '{slug}' already exists in this scope"
        )))
    } else {
        Ok(())
    }
}

fn ensure_scope(tag: &Tag, note: &Note) -> Result<()> {
    if tag.fits_scope(note.owner.as_deref()) {
        Ok(())
    } else {
        Err(NotableError::ScopeMismatch(format!(
            "Tag {} belongs to a different user than note {}",
            tag.id, note.id
        )))
    }
}

fn insert_tag(
    tx: &Transaction,
    log: &OperationLog,
    owner: Option<&str>,
    name: &str,
    slug: &str,
    now: i64,
) -> Result<String> {
    let tag_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO tags (id, owner_id, name, slug, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        rusqlite::params![tag_id, owner, name, slug, now, now],
    )?;
    log.record(
        tx,
        &Operation::CreateTag {
            tag_id: tag_id.clone(),
            owner: owner.map(str::to_string),
            name: name.to_string(),
            slug: slug.to_string(),
        },
    )?;
    Ok(tag_id)
}

/// Makes the note's tag slugs equal to the normalized `requested` set.
///
/// Associations whose slug is not requested are removed. Requested slugs
/// the note lacks are looked up in the note owner's scope and created there
/// (with the slug as name) when missing. Returns the normalized slugs.
pub(crate) fn reconcile_note_tags(
    tx: &Transaction,
    log: &OperationLog,
    note_id: &str,
    owner: Option<&str>,
    requested: &[String],
    now: i64,
) -> Result<Vec<String>> {
    let wanted = normalize_tag_slugs(requested);

    // Global and user tags may share a slug, so keep (id, slug) pairs.
    let current: Vec<(String, String)> = {
        let mut stmt = tx.prepare(
            "SELECT t.id, t.slug FROM note_tags nt JOIN tags t ON t.id = nt.tag_id
             WHERE nt.note_id = ?",
        )?;
        let rows = stmt
            .query_map([note_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let wanted_set: HashSet<&str> = wanted.iter().map(String::as_str).collect();
    for (tag_id, slug) in &current {
        if !wanted_set.contains(slug.as_str()) {
            tx.execute(
                "DELETE FROM note_tags WHERE note_id = ?1 AND tag_id = ?2",
                rusqlite::params![note_id, tag_id],
            )?;
        }
    }

    let current_slugs: HashSet<&str> = current.iter().map(|(_, slug)| slug.as_str()).collect();
    for slug in wanted.iter().filter(|s| !current_slugs.contains(s.as_str())) {
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM tags WHERE owner_id IS ?1 AND slug = ?2",
                rusqlite::params![owner, slug],
                |row| row.get(0),
            )
            .optional()?;
        let tag_id = match existing {
            Some(tag_id) => tag_id,
            None => {
                ensure_tag_unique(tx, owner, slug, slug, None)?;
                insert_tag(tx, log, owner, slug, slug, now)?
            }
        };
        tx.execute(
            "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?1, ?2)",
            rusqlite::params![note_id, tag_id],
        )?;
    }

    Ok(wanted)
}

impl Workspace {
    /// Creates a tag in `owner`'s scope (global when `None`).
    ///
    /// The slug is `slugify(slug)` when a non-blank slug is supplied, and
    /// `slugify(name)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::Conflict`] if the scope already has a tag with
    /// the same name or slug, or [`NotableError::InvalidOperation`] for a
    /// blank name.
    pub fn create_tag(&mut self, owner: Option<&str>, name: &str, slug: Option<&str>) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NotableError::InvalidOperation(
                "Tag name must not be empty".to_string(),
            ));
        }
        let slug = slugify(slug.filter(|s| !s.trim().is_empty()).unwrap_or(name));

        let now = now_millis();
        let tx = self.storage.begin_write()?;
        ensure_tag_unique(&tx, owner, name, &slug, None)?;
        let tag_id = insert_tag(&tx, &self.operation_log, owner, name, &slug, now)?;
        let tag = fetch_tag(&tx, &tag_id)?;
        tx.commit()?;

        log::debug!("Created tag {} ({}) for {:?}", tag.slug, tag.id, tag.owner);
        Ok(tag)
    }

    /// Renames a tag. A blank or absent `name` keeps the current name; an
    /// absent `slug` keeps the current slug.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] for an unknown tag, and
    /// [`NotableError::Conflict`] if the new name or slug collides within the
    /// tag's scope.
    pub fn update_tag(&mut self, tag_id: &str, name: Option<&str>, slug: Option<&str>) -> Result<Tag> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let tag = fetch_tag(&tx, tag_id)?;

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&tag.name)
            .to_string();
        let slug = match slug {
            Some(s) if s.trim().is_empty() => {
                return Err(NotableError::InvalidOperation(
                    "Tag slug must not be empty".to_string(),
                ));
            }
            Some(s) => slugify(s),
            None => tag.slug.clone(),
        };

        ensure_tag_unique(&tx, tag.owner.as_deref(), &name, &slug, Some(tag_id))?;
        tx.execute(
            "UPDATE tags SET name = ?1, slug = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![name, slug, now, tag_id],
        )?;
        self.operation_log.record(
            &tx,
            &Operation::UpdateTag {
                tag_id: tag_id.to_string(),
                name,
                slug,
            },
        )?;
        let updated = fetch_tag(&tx, tag_id)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Deletes a tag and every association to it.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the tag does not exist.
    pub fn delete_tag(&mut self, tag_id: &str) -> Result<()> {
        let tx = self.storage.begin_write()?;
        if tx.execute("DELETE FROM tags WHERE id = ?", [tag_id])? == 0 {
            return Err(NotableError::tag_not_found(tag_id));
        }
        self.operation_log.record(&tx, &Operation::DeleteTag { tag_id: tag_id.to_string() })?;
        tx.commit()?;
        log::debug!("Deleted tag {tag_id}");
        Ok(())
    }

    pub fn get_tag(&self, tag_id: &str) -> Result<Tag> {
        fetch_tag(self.connection(), tag_id)
    }

    /// Lists tags ordered by name, optionally only those owned by `owner`.
    pub fn list_tags(&self, owner: Option<&str>, limit: Option<u32>, offset: u32) -> Result<TagPage> {
        let conn = self.connection();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tags WHERE (?1 IS NULL OR owner_id = ?1)",
            [owner],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE (?1 IS NULL OR owner_id = ?1)
             ORDER BY name, rowid LIMIT ?2 OFFSET ?3"
        ))?;
        let items = stmt
            .query_map(
                rusqlite::params![owner, self.settings.page_limit(limit), offset],
                map_tag_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(TagPage {
            total: total as u64,
            items,
        })
    }

    /// Returns the notes carrying `tag_id`, in sibling order.
    pub fn notes_for_tag(&self, tag_id: &str) -> Result<Vec<Note>> {
        fetch_tag(self.connection(), tag_id)?;
        query_notes(
            self.connection(),
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes n
                 WHERE EXISTS (SELECT 1 FROM note_tags nt WHERE nt.note_id = n.id AND nt.tag_id = ?1)
                 ORDER BY {NOTE_ORDER}"
            ),
            vec![SqlValue::Text(tag_id.to_string())],
        )
    }

    /// Replaces the note's tag set with `tags` (trimmed, blanks and
    /// duplicates dropped), creating missing tags in the note owner's scope.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] if the note does not exist.
    pub fn set_note_tags(&mut self, note_id: &str, tags: &[String]) -> Result<Note> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let note = fetch_note(&tx, note_id)?;
        let tags = reconcile_note_tags(&tx, &self.operation_log, note_id, note.owner.as_deref(), tags, now)?;
        tx.execute(
            "UPDATE notes SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, note_id],
        )?;
        self.operation_log.record(
            &tx,
            &Operation::SetNoteTags { note_id: note_id.to_string(), tags },
        )?;
        let note = fetch_note(&tx, note_id)?;
        tx.commit()?;
        Ok(note)
    }

    /// Attaches an existing tag to a note. Attaching twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`NotableError::NotFound`] for an unknown note or tag, and
    /// [`NotableError::ScopeMismatch`] if the tag belongs to another user.
    pub fn attach_tag(&mut self, note_id: &str, tag_id: &str) -> Result<Note> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let note = fetch_note(&tx, note_id)?;
        let tag = fetch_tag(&tx, tag_id)?;
        ensure_scope(&tag, &note)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?1, ?2)",
            rusqlite::params![note_id, tag_id],
        )?;
        if inserted > 0 {
            tx.execute(
                "UPDATE notes SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, note_id],
            )?;
            self.operation_log.record(
                &tx,
                &Operation::AttachTag { note_id: note_id.to_string(), tag_id: tag_id.to_string() },
            )?;
        }
        let note = fetch_note(&tx, note_id)?;
        tx.commit()?;
        Ok(note)
    }

    /// Detaches a tag from a note. Detaching an absent association is a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`attach_tag`](Self::attach_tag).
    pub fn detach_tag(&mut self, note_id: &str, tag_id: &str) -> Result<Note> {
        let now = now_millis();
        let tx = self.storage.begin_write()?;
        let note = fetch_note(&tx, note_id)?;
        let tag = fetch_tag(&tx, tag_id)?;
        ensure_scope(&tag, &note)?;

        let removed = tx.execute(
            "DELETE FROM note_tags WHERE note_id = ?1 AND tag_id = ?2",
            rusqlite::params![note_id, tag_id],
        )?;
        if removed > 0 {
            tx.execute(
                "UPDATE notes SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, note_id],
            )?;
            self.operation_log.record(
                &tx,
                &Operation::DetachTag { note_id: note_id.to_string(), tag_id: tag_id.to_string() },
            )?;
        }
        let note = fetch_note(&tx, note_id)?;
        tx.commit()?;
        Ok(note)
    }
}
