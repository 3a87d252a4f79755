//! Core library for Notable, a hierarchical note store on SQLite.
//!
//! The primary entry point is [`Workspace`], which represents an open
//! workspace database file. All mutations go through `Workspace` methods:
//! the note forest and its sibling ordering, per-user and global tags,
//! versioned note content, and blob references. Rich-text documents are
//! flattened to Markdown-flavoured text by [`render_document`].
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    asset::Asset,
    content::ContentVersion,
    delete::DeleteResult,
    error::{ErrorKind, NotableError, Result},
    note::{NewNote, Note, NoteFilter, NotePage, NoteTreeNode, NoteUpdate},
    operation::Operation,
    operation_log::{OperationLog, OperationSummary, PurgeStrategy},
    render::{render_document, DocNode, Mark, MarkKind, NodeKind},
    settings::{load_settings, save_settings, settings_file_path, Settings},
    storage::Storage,
    tag::{normalize_tag_slugs, slugify, Tag, TagPage},
    workspace::Workspace,
};
