//! Shared filesystem types for mountvfs.
//!
//! A leaf crate with no internal dependencies. The kernel crate builds its
//! backends and mount resolver on top of these.
//!
//! # Key Types
//!
//! |------------------|---------------------------------------------------|
//! | Type             | Purpose                                           |
//! |------------------|---------------------------------------------------|
//! | [`FileStats`]    | Read-only metadata view of a file or directory    |
//! | [`FileEntry`]    | One child produced by a directory listing         |
//! | [`FileKind`]     | File or directory                                 |
//! | [`Content`]      | Stored file payload, text or binary               |
//! | [`VfsEvent`]     | Change notification emitted by the service        |
//! | [`BackendKind`]  | Which family of storage engine backs a mount      |
//! |------------------|---------------------------------------------------|

pub mod backend;
pub mod content;
pub mod event;
pub mod stats;

pub use backend::BackendKind;
pub use content::Content;
pub use event::VfsEvent;
pub use stats::{FileEntry, FileKind, FileStats, sort_entries};
