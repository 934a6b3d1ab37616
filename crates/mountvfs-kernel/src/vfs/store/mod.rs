//! Flat record stores.
//!
//! A record store knows nothing about hierarchy. It holds two independent
//! collections keyed by canonical path: file records and directory records.
//! [`FlatStoreBackend`](crate::vfs::backends::FlatStoreBackend) derives the
//! whole directory tree from prefix comparisons over those keys.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mountvfs_types::{Content, FileStats};

use super::VfsResult;

/// A stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub content: Content,
    pub size: u64,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileRecord {
    /// Build a record written now. `ctime` carries over from the record
    /// being replaced, if any.
    pub fn new(path: impl Into<String>, content: Content, ctime: Option<SystemTime>) -> Self {
        let now = SystemTime::now();
        Self {
            path: path.into(),
            size: content.size(),
            content,
            mtime: now,
            ctime: ctime.unwrap_or(now),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.content.is_binary()
    }

    pub fn stats(&self) -> FileStats {
        FileStats::file(self.size, self.mtime, Some(self.ctime))
    }
}

/// A stored directory marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub path: String,
    pub ctime: SystemTime,
}

impl DirectoryRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ctime: SystemTime::now(),
        }
    }

    pub fn stats(&self) -> FileStats {
        FileStats::directory(self.ctime)
    }
}

/// Half-open key range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: String,
    pub end: String,
}

impl KeyRange {
    /// Every key that begins with `prefix`.
    ///
    /// The upper bound appends the highest scalar value, which sorts after
    /// any key continuing the prefix under byte-wise comparison.
    pub fn prefix(prefix: &str) -> Self {
        let mut end = String::with_capacity(prefix.len() + 4);
        end.push_str(prefix);
        end.push(char::MAX);
        Self {
            start: prefix.to_string(),
            end,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        key >= self.start.as_str() && key < self.end.as_str()
    }
}

/// Key-addressed storage with two collections.
///
/// Multi-record calls run against one read view (`get_*s`) or commit as one
/// unit (`put_*s`). Point deletes of missing keys succeed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_file(&self, path: &str) -> VfsResult<Option<FileRecord>>;

    /// Fetch many file records. Missing keys are skipped.
    async fn get_files(&self, paths: &[String]) -> VfsResult<Vec<FileRecord>>;

    /// Keys among `paths` that have a file record, content left unread.
    async fn existing_file_keys(&self, paths: &[String]) -> VfsResult<Vec<String>>;

    async fn put_file(&self, record: FileRecord) -> VfsResult<()>;

    async fn put_files(&self, records: Vec<FileRecord>) -> VfsResult<()>;

    async fn delete_file(&self, path: &str) -> VfsResult<()>;

    /// Keys of file records within `range`, in key order.
    async fn scan_file_keys(&self, range: &KeyRange) -> VfsResult<Vec<String>>;

    async fn get_dir(&self, path: &str) -> VfsResult<Option<DirectoryRecord>>;

    /// Fetch many directory records. Missing keys are skipped.
    async fn get_dirs(&self, paths: &[String]) -> VfsResult<Vec<DirectoryRecord>>;

    async fn put_dirs(&self, records: Vec<DirectoryRecord>) -> VfsResult<()>;

    async fn delete_dir(&self, path: &str) -> VfsResult<()>;

    /// Keys of directory records within `range`, in key order.
    async fn scan_dir_keys(&self, range: &KeyRange) -> VfsResult<Vec<String>>;
}

pub(crate) fn to_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub(crate) fn from_millis(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_range() {
        let range = KeyRange::prefix("/a/");
        assert!(range.contains("/a/b"));
        assert!(range.contains("/a/b/c"));
        assert!(range.contains("/a/\u{ffff}"));
        assert!(!range.contains("/a"));
        assert!(!range.contains("/ab"));
        assert!(!range.contains("/b/a"));
    }

    #[test]
    fn test_record_keeps_ctime() {
        let first = FileRecord::new("/f", Content::from("one"), None);
        let second = FileRecord::new("/f", Content::from("three"), Some(first.ctime));
        assert_eq!(second.ctime, first.ctime);
        assert_eq!(second.size, 5);
        assert!(second.mtime >= first.mtime);
    }

    #[test]
    fn test_millis_round_trip() {
        let t = from_millis(1_700_000_000_123);
        assert_eq!(to_millis(t), 1_700_000_000_123);
    }
}
