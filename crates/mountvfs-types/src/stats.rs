//! Metadata and directory listing types.
//!
//! Both are derived views: nothing here is persisted by a backend.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_directory(&self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// File attributes as reported by `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Size in bytes. Always zero for directories.
    pub size: u64,
    /// File type.
    pub kind: FileKind,
    /// Last modification time. Directories report their creation time.
    pub mtime: SystemTime,
    /// Creation time, when the backend tracks it.
    pub ctime: Option<SystemTime>,
}

impl FileStats {
    /// Stats for a regular file.
    pub fn file(size: u64, mtime: SystemTime, ctime: Option<SystemTime>) -> Self {
        Self {
            size,
            kind: FileKind::File,
            mtime,
            ctime,
        }
    }

    /// Stats for a directory created at `ctime`.
    pub fn directory(ctime: SystemTime) -> Self {
        Self {
            size: 0,
            kind: FileKind::Directory,
            mtime: ctime,
            ctime: Some(ctime),
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name, a single path segment.
    pub name: String,
    /// Full canonical path of the child.
    pub path: String,
    /// Entry type.
    pub kind: FileKind,
}

impl FileEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: FileKind::File,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: FileKind::Directory,
        }
    }

    /// Returns true if this entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

/// Sort entries the way every listing is returned: directories first, then
/// lexicographically by name.
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.cmp(&b.name))
    });
}
