//! In-memory record store.
//!
//! Used for scratch mounts and testing. All data is lost when dropped.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{DirectoryRecord, FileRecord, KeyRange, RecordStore};
use crate::vfs::VfsResult;

/// Two ordered maps, one per collection.
///
/// Ordered maps give range scans for free. Each collection has its own lock;
/// a multi-key read holds one read guard for its whole lookup.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    files: RwLock<BTreeMap<String, FileRecord>>,
    dirs: RwLock<BTreeMap<String, DirectoryRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of file records held.
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Number of directory records held.
    pub fn dir_count(&self) -> usize {
        self.dirs.read().len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_file(&self, path: &str) -> VfsResult<Option<FileRecord>> {
        Ok(self.files.read().get(path).cloned())
    }

    async fn get_files(&self, paths: &[String]) -> VfsResult<Vec<FileRecord>> {
        let files = self.files.read();
        Ok(paths.iter().filter_map(|p| files.get(p).cloned()).collect())
    }

    async fn existing_file_keys(&self, paths: &[String]) -> VfsResult<Vec<String>> {
        let files = self.files.read();
        Ok(paths.iter().filter(|p| files.contains_key(*p)).cloned().collect())
    }

    async fn put_file(&self, record: FileRecord) -> VfsResult<()> {
        self.files.write().insert(record.path.clone(), record);
        Ok(())
    }

    async fn put_files(&self, records: Vec<FileRecord>) -> VfsResult<()> {
        let mut files = self.files.write();
        for record in records {
            files.insert(record.path.clone(), record);
        }
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> VfsResult<()> {
        self.files.write().remove(path);
        Ok(())
    }

    async fn scan_file_keys(&self, range: &KeyRange) -> VfsResult<Vec<String>> {
        let files = self.files.read();
        Ok(files
            .range(range.start.clone()..range.end.clone())
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get_dir(&self, path: &str) -> VfsResult<Option<DirectoryRecord>> {
        Ok(self.dirs.read().get(path).cloned())
    }

    async fn get_dirs(&self, paths: &[String]) -> VfsResult<Vec<DirectoryRecord>> {
        let dirs = self.dirs.read();
        Ok(paths.iter().filter_map(|p| dirs.get(p).cloned()).collect())
    }

    async fn put_dirs(&self, records: Vec<DirectoryRecord>) -> VfsResult<()> {
        let mut dirs = self.dirs.write();
        for record in records {
            // Upsert keeps the first ctime when two mkdirs race.
            dirs.entry(record.path.clone()).or_insert(record);
        }
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> VfsResult<()> {
        self.dirs.write().remove(path);
        Ok(())
    }

    async fn scan_dir_keys(&self, range: &KeyRange) -> VfsResult<Vec<String>> {
        let dirs = self.dirs.read();
        Ok(dirs
            .range(range.start.clone()..range.end.clone())
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mountvfs_types::Content;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryRecordStore::new();
        store
            .put_file(FileRecord::new("/a.txt", Content::from("hi"), None))
            .await
            .unwrap();

        let record = store.get_file("/a.txt").await.unwrap().unwrap();
        assert_eq!(record.content, Content::from("hi"));
        assert!(store.get_file("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_files_skips_missing() {
        let store = MemoryRecordStore::new();
        store
            .put_files(vec![
                FileRecord::new("/x", Content::from("1"), None),
                FileRecord::new("/y", Content::from("2"), None),
            ])
            .await
            .unwrap();

        let found = store
            .get_files(&["/x".to_string(), "/nope".to_string(), "/y".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let keys = store
            .existing_file_keys(&["/nope".to_string(), "/y".to_string()])
            .await
            .unwrap();
        assert_eq!(keys, ["/y"]);
    }

    #[tokio::test]
    async fn test_range_scan_excludes_siblings() {
        let store = MemoryRecordStore::new();
        store
            .put_dirs(vec![
                DirectoryRecord::new("/a"),
                DirectoryRecord::new("/a/b"),
                DirectoryRecord::new("/ab"),
                DirectoryRecord::new("/a/b/c"),
            ])
            .await
            .unwrap();

        let keys = store.scan_dir_keys(&KeyRange::prefix("/a/")).await.unwrap();
        assert_eq!(keys, ["/a/b", "/a/b/c"]);
    }

    #[tokio::test]
    async fn test_put_dirs_keeps_existing_ctime() {
        let store = MemoryRecordStore::new();
        let first = DirectoryRecord::new("/d");
        store.put_dirs(vec![first.clone()]).await.unwrap();
        store.put_dirs(vec![DirectoryRecord::new("/d")]).await.unwrap();

        assert_eq!(store.get_dir("/d").await.unwrap().unwrap().ctime, first.ctime);
        assert_eq!(store.dir_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryRecordStore::new();
        store.delete_file("/nothing").await.unwrap();
        store.delete_dir("/nothing").await.unwrap();
        assert_eq!(store.file_count(), 0);
    }
}
