//! Internal domain modules for the Notable core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod asset;
pub mod content;
pub mod delete;
pub mod error;
pub mod note;
pub mod operation;
pub mod operation_log;
pub mod render;
pub mod settings;
pub mod storage;
pub mod tag;
pub mod workspace;

#[doc(inline)]
pub use asset::Asset;
#[doc(inline)]
pub use content::ContentVersion;
#[doc(inline)]
pub use delete::DeleteResult;
#[doc(inline)]
pub use error::{ErrorKind, NotableError, Result};
#[doc(inline)]
pub use note::{NewNote, Note, NoteFilter, NotePage, NoteTreeNode, NoteUpdate};
#[doc(inline)]
pub use operation::Operation;
#[doc(inline)]
pub use operation_log::{OperationLog, OperationSummary, PurgeStrategy};
#[doc(inline)]
pub use render::{render_document, DocNode, Mark, MarkKind, NodeKind};
#[doc(inline)]
pub use settings::{load_settings, save_settings, settings_file_path, Settings};
#[doc(inline)]
pub use storage::Storage;
#[doc(inline)]
pub use tag::{normalize_tag_slugs, slugify, Tag, TagPage};
#[doc(inline)]
pub use workspace::Workspace;
