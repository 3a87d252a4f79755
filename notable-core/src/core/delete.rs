//! Result type for note removal.
//!
//! Deleting a note never deletes its descendants: direct children are
//! re-rooted after the existing root notes, keeping their relative order.
//!
//! ## Examples
//!
//! ```rust
//! use notable_core::DeleteResult;
//!
//! let result = DeleteResult {
//!     deleted_id: "a".to_string(),
//!     reparented_ids: vec!["b".to_string(), "c".to_string()],
//! };
//! let json = serde_json::to_string(&result).unwrap();
//! assert!(json.contains("deletedId"));
//! assert!(json.contains("reparentedIds"));
//! ```

use serde::{Deserialize, Serialize};

/// Summary returned by [`Workspace::delete_note`](crate::Workspace::delete_note).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// ID of the removed note.
    pub deleted_id: String,
    /// Former direct children, now root-level, in their previous order.
    pub reparented_ids: Vec<String>,
}
