use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A node in the note forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    /// Owning user, or `None` for a globally owned note.
    pub owner: Option<String>,
    pub title: String,
    pub slug: String,
    pub kind: String,
    pub parent_id: Option<String>,
    /// Zero-based order among notes sharing `parent_id`.
    pub position: i64,
    pub metadata: Map<String, Value>,
    /// Slugs of associated tags, sorted.
    pub tags: Vec<String>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

/// Input for [`Workspace::create_note`](crate::Workspace::create_note).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewNote {
    pub owner: Option<String>,
    pub title: String,
    pub slug: String,
    pub kind: String,
    pub parent_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub tags: Vec<String>,
}

/// Partial update for [`Workspace::update_note`](crate::Workspace::update_note).
///
/// `None` leaves a field untouched. For `parent_id` and `owner`,
/// `Some(None)` clears the value (move to root level / make global).
/// On the wire a missing key means `None` and an explicit `null` means
/// `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_clearable"
    )]
    pub parent_id: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_clearable"
    )]
    pub owner: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Maps a present key (value or `null`) to `Some(..)`; a missing key falls
/// back to the field default.
fn deserialize_clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Criteria shared by [`Workspace::list_notes`](crate::Workspace::list_notes)
/// and [`Workspace::note_tree`](crate::Workspace::note_tree). Unset fields
/// match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteFilter {
    pub owner: Option<String>,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    pub kind: Option<String>,
    /// Tag slug; scoped to `owner` when both are set.
    pub tag: Option<String>,
}

impl NoteFilter {
    /// Renders the filter as a SQL condition over the `notes n` alias,
    /// together with its positional parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses = vec!["1 = 1".to_string()];
        let mut params = Vec::new();

        if let Some(owner) = &self.owner {
            clauses.push("n.owner_id = ?".to_string());
            params.push(owner.clone());
        }
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            clauses.push("instr(lower(n.title), lower(?)) > 0".to_string());
            params.push(title.to_string());
        }
        if let Some(kind) = &self.kind {
            clauses.push("n.kind = ?".to_string());
            params.push(kind.clone());
        }
        if let Some(tag) = &self.tag {
            // EXISTS keeps one row per note however many tags match.
            let mut clause = "EXISTS (SELECT 1 FROM note_tags nt JOIN tags t ON t.id = nt.tag_id
                 WHERE nt.note_id = n.id AND t.slug = ?"
                .to_string();
            params.push(tag.clone());
            if let Some(owner) = &self.owner {
                clause.push_str(" AND t.owner_id = ?");
                params.push(owner.clone());
            }
            clause.push(')');
            clauses.push(clause);
        }

        (clauses.join(" AND "), params)
    }
}

/// A note together with its direct children, as returned by
/// [`Workspace::note_tree`](crate::Workspace::note_tree).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTreeNode {
    #[serde(flatten)]
    pub note: Note,
    pub children: Vec<NoteTreeNode>,
}

/// One page of a flat note listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePage {
    /// Number of distinct notes matching the filter, ignoring pagination.
    pub total: u64,
    pub items: Vec<Note>,
}
