//! Journal entry types recorded for every committed workspace mutation.

use serde::{Deserialize, Serialize};

/// A single committed mutation, as stored in the `operations` table.
///
/// Operations capture enough of each change's intent to audit what happened
/// to a note or tag after the fact. Identifiers and timestamps are assigned
/// by [`OperationLog::log`](crate::OperationLog::log).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    /// A note was inserted into the hierarchy.
    CreateNote {
        note_id: String,
        owner: Option<String>,
        parent_id: Option<String>,
        /// Position assigned among its new siblings.
        position: i64,
        slug: String,
        kind: String,
    },
    /// Scalar fields of a note changed. Lists the names of changed fields.
    UpdateNote { note_id: String, fields: Vec<String> },
    /// A note was relocated to a new parent and/or position.
    MoveNote {
        note_id: String,
        new_parent_id: Option<String>,
        new_position: i64,
    },
    /// A note was deleted; its children were re-rooted.
    DeleteNote {
        note_id: String,
        reparented_ids: Vec<String>,
    },
    /// The full tag set of a note was reconciled to `tags`.
    SetNoteTags { note_id: String, tags: Vec<String> },
    AttachTag { note_id: String, tag_id: String },
    DetachTag { note_id: String, tag_id: String },
    CreateTag {
        tag_id: String,
        owner: Option<String>,
        name: String,
        slug: String,
    },
    UpdateTag {
        tag_id: String,
        name: String,
        slug: String,
    },
    DeleteTag { tag_id: String },
    /// A content version was appended to a note's chain.
    AppendVersion { note_id: String, version: i64 },
    /// A content version was soft-deleted (`deleted = true`) or restored.
    SetVersionDeleted {
        note_id: String,
        version: i64,
        deleted: bool,
    },
    AddAsset {
        note_id: String,
        asset_id: String,
        storage_key: String,
    },
    RemoveAsset { note_id: String, asset_id: String },
}

impl Operation {
    /// Returns the variant name stored in the `operation_type` column.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateNote { .. } => "CreateNote",
            Self::UpdateNote { .. } => "UpdateNote",
            Self::MoveNote { .. } => "MoveNote",
            Self::DeleteNote { .. } => "DeleteNote",
            Self::SetNoteTags { .. } => "SetNoteTags",
            Self::AttachTag { .. } => "AttachTag",
            Self::DetachTag { .. } => "DetachTag",
            Self::CreateTag { .. } => "CreateTag",
            Self::UpdateTag { .. } => "UpdateTag",
            Self::DeleteTag { .. } => "DeleteTag",
            Self::AppendVersion { .. } => "AppendVersion",
            Self::SetVersionDeleted { .. } => "SetVersionDeleted",
            Self::AddAsset { .. } => "AddAsset",
            Self::RemoveAsset { .. } => "RemoveAsset",
        }
    }

    /// Returns the note this operation touched, if it concerns a single note.
    #[must_use]
    pub fn note_id(&self) -> Option<&str> {
        match self {
            Self::CreateNote { note_id, .. }
            | Self::UpdateNote { note_id, .. }
            | Self::MoveNote { note_id, .. }
            | Self::DeleteNote { note_id, .. }
            | Self::SetNoteTags { note_id, .. }
            | Self::AttachTag { note_id, .. }
            | Self::DetachTag { note_id, .. }
            | Self::AppendVersion { note_id, .. }
            | Self::SetVersionDeleted { note_id, .. }
            | Self::AddAsset { note_id, .. }
            | Self::RemoveAsset { note_id, .. } => Some(note_id),
            Self::CreateTag { .. } | Self::UpdateTag { .. } | Self::DeleteTag { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_serialization_is_tagged() {
        let op = Operation::MoveNote {
            note_id: "note-1".to_string(),
            new_parent_id: None,
            new_position: 2,
        };

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "MoveNote");
        let deserialized: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized, op);
    }

    #[test]
    fn test_note_id_accessor() {
        let op = Operation::AppendVersion { note_id: "n".into(), version: 1 };
        assert_eq!(op.note_id(), Some("n"));
        assert_eq!(op.type_name(), "AppendVersion");
        let op = Operation::DeleteTag { tag_id: "t".into() };
        assert_eq!(op.note_id(), None);
    }
}
