//! Change notifications.

use serde::{Deserialize, Serialize};

/// Event emitted after a successful mutation through the virtual filesystem.
///
/// Serializes as `{"type": "file:created", "path": "/a/b.txt"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VfsEvent {
    #[serde(rename = "file:created")]
    FileCreated { path: String },
    #[serde(rename = "file:modified")]
    FileModified { path: String },
    #[serde(rename = "file:deleted")]
    FileDeleted { path: String },
    #[serde(rename = "directory:created")]
    DirectoryCreated { path: String },
    #[serde(rename = "directory:deleted")]
    DirectoryDeleted { path: String },
}

impl VfsEvent {
    /// Event type tag, e.g. `file:created`.
    pub fn subject(&self) -> &'static str {
        match self {
            VfsEvent::FileCreated { .. } => "file:created",
            VfsEvent::FileModified { .. } => "file:modified",
            VfsEvent::FileDeleted { .. } => "file:deleted",
            VfsEvent::DirectoryCreated { .. } => "directory:created",
            VfsEvent::DirectoryDeleted { .. } => "directory:deleted",
        }
    }

    /// Absolute virtual path the event refers to.
    pub fn path(&self) -> &str {
        match self {
            VfsEvent::FileCreated { path }
            | VfsEvent::FileModified { path }
            | VfsEvent::FileDeleted { path }
            | VfsEvent::DirectoryCreated { path }
            | VfsEvent::DirectoryDeleted { path } => path,
        }
    }

    /// `file:created` or `file:modified` depending on whether the path
    /// existed before the write.
    pub fn file_written(path: impl Into<String>, existed: bool) -> Self {
        let path = path.into();
        if existed {
            VfsEvent::FileModified { path }
        } else {
            VfsEvent::FileCreated { path }
        }
    }
}
