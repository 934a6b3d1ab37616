//! Flat-store backend: directories emulated over a key-value record store.
//!
//! # Model
//!
//! The underlying [`RecordStore`] holds file records and directory records
//! keyed by canonical path, with no notion of nesting. Hierarchy is derived:
//!
//! - A directory exists iff it has an explicit record. `mkdir` writes a
//!   record for every missing ancestor, so each level of a tree has one.
//! - Children of `/a` are the keys in `["/a/", "/a/" + char::MAX)`. A file
//!   key is a direct child when its remainder has no `/`; a directory key
//!   contributes the first segment of its remainder.
//! - A path holds a file or a directory, never both. Writes refuse a path
//!   with a directory record and `mkdir` refuses an ancestor held by a file.
//! - Writes create the parent chain first. The two steps are not joined in
//!   one transaction; a file whose parent marker went missing in between
//!   still stats, reads and lists correctly.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use mountvfs_types::{BackendKind, Content, FileEntry, FileStats, sort_entries};

use crate::config::FlatStoreConfig;
use crate::vfs::batch::BatchWriteOptions;
use crate::vfs::ops::{BatchOps, StorageBackend};
use crate::vfs::path;
use crate::vfs::store::{
    DirectoryRecord, FileRecord, KeyRange, MemoryRecordStore, RecordStore, SqliteRecordStore,
};
use crate::vfs::{VfsError, VfsResult};

/// Storage backend over a flat record store.
pub struct FlatStoreBackend {
    store: Arc<dyn RecordStore>,
    config: FlatStoreConfig,
}

impl std::fmt::Debug for FlatStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatStoreBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FlatStoreBackend {
    /// Create a backend over any record store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_config(store, FlatStoreConfig::default())
    }

    pub fn with_config(store: Arc<dyn RecordStore>, config: FlatStoreConfig) -> Self {
        Self { store, config }
    }

    /// Ephemeral backend over a [`MemoryRecordStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()))
    }

    /// Persistent backend over a SQLite database file.
    pub fn sqlite(db_path: impl AsRef<std::path::Path>) -> VfsResult<Self> {
        Ok(Self::new(Arc::new(SqliteRecordStore::open(db_path)?)))
    }

    pub fn config(&self) -> &FlatStoreConfig {
        &self.config
    }

    /// Write a record, creating the parent chain first.
    async fn put_content(&self, path: &str, content: Content) -> VfsResult<()> {
        let normalized = path::normalize(path);
        let parent = path::parent(&normalized).ok_or_else(|| {
            VfsError::invalid_operation("cannot write to the root directory")
        })?;
        if self.store.get_dir(&normalized).await?.is_some() {
            return Err(VfsError::invalid_operation(format!(
                "is a directory: {}",
                normalized
            )));
        }

        if parent != path::ROOT {
            self.mkdir(&parent).await?;
        }

        let ctime = self
            .store
            .get_file(&normalized)
            .await?
            .map(|existing| existing.ctime);
        self.store
            .put_file(FileRecord::new(normalized, content, ctime))
            .await
    }

    async fn get_content(&self, path: &str) -> VfsResult<Content> {
        let normalized = path::normalize(path);
        match self.store.get_file(&normalized).await? {
            Some(record) => Ok(record.content),
            None if self.is_dir(&normalized).await? => Err(VfsError::invalid_operation(
                format!("is a directory: {}", normalized),
            )),
            None => Err(VfsError::not_found(normalized)),
        }
    }

    async fn is_dir(&self, normalized: &str) -> VfsResult<bool> {
        if normalized == path::ROOT {
            return Ok(true);
        }
        Ok(self.store.get_dir(normalized).await?.is_some())
    }

    /// Fail if any of `paths` is held by a file record.
    async fn ensure_no_files(&self, paths: &[String]) -> VfsResult<()> {
        match self.store.existing_file_keys(paths).await?.into_iter().next() {
            Some(file) => Err(VfsError::invalid_operation(format!(
                "not a directory: {}",
                file
            ))),
            None => Ok(()),
        }
    }

    /// Create every missing directory among `paths` in one batch.
    ///
    /// A path already held by a file is refused before anything is written.
    async fn create_dirs(&self, paths: Vec<String>) -> VfsResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.ensure_no_files(&paths).await?;
        let existing: HashSet<String> = self
            .store
            .get_dirs(&paths)
            .await?
            .into_iter()
            .map(|record| record.path)
            .collect();

        let missing: Vec<DirectoryRecord> = paths
            .into_iter()
            .filter(|p| !existing.contains(p))
            .map(DirectoryRecord::new)
            .collect();

        if !missing.is_empty() {
            tracing::debug!(count = missing.len(), "creating directory records");
            self.store.put_dirs(missing).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FlatStoreBackend {
    async fn read_file(&self, path: &str) -> VfsResult<String> {
        let normalized = path::normalize(path);
        self.get_content(&normalized)
            .await?
            .into_text()
            .map_err(|_| VfsError::invalid_operation(format!("not valid UTF-8: {}", normalized)))
    }

    async fn read_binary(&self, path: &str) -> VfsResult<Vec<u8>> {
        Ok(self.get_content(path).await?.into_bytes())
    }

    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    async fn stat(&self, path: &str) -> VfsResult<FileStats> {
        let normalized = path::normalize(path);
        if let Some(file) = self.store.get_file(&normalized).await? {
            return Ok(file.stats());
        }
        if normalized == path::ROOT {
            return Ok(FileStats::directory(std::time::UNIX_EPOCH));
        }
        match self.store.get_dir(&normalized).await? {
            Some(dir) => Ok(dir.stats()),
            None => Err(VfsError::not_found(normalized)),
        }
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<FileEntry>> {
        let normalized = path::normalize(path);
        let prefix = path::child_prefix(&normalized);
        let range = KeyRange::prefix(&prefix);

        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for key in self.store.scan_file_keys(&range).await? {
            let rest = &key[prefix.len()..];
            if !rest.is_empty() && !rest.contains('/') && seen.insert(rest.to_string()) {
                entries.push(FileEntry::file(rest, key.as_str()));
            }
        }

        for key in self.store.scan_dir_keys(&range).await? {
            let rest = &key[prefix.len()..];
            let Some(name) = rest.split('/').next().filter(|n| !n.is_empty()) else {
                continue;
            };
            if seen.insert(name.to_string()) {
                entries.push(FileEntry::directory(name, path::join(&normalized, name)));
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn write_file(&self, path: &str, content: &str) -> VfsResult<()> {
        self.put_content(path, Content::from(content)).await
    }

    async fn write_binary(&self, path: &str, content: &[u8]) -> VfsResult<()> {
        self.put_content(path, Content::from(content.to_vec())).await
    }

    async fn delete_file(&self, path: &str) -> VfsResult<()> {
        self.store.delete_file(&path::normalize(path)).await
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        self.create_dirs(path::ancestors(path)).await
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let normalized = path::normalize(path);
        if recursive {
            for entry in self.readdir(&normalized).await? {
                if entry.is_directory() {
                    self.rmdir(&entry.path, true).await?;
                } else {
                    self.store.delete_file(&entry.path).await?;
                }
            }
        }
        // Non-recursive removal does not check for children; anything left
        // underneath stays reachable by its own key.
        self.store.delete_dir(&normalized).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        if self.is_dir(&from).await? {
            return Err(VfsError::invalid_operation(format!(
                "cannot rename directory: {}",
                from
            )));
        }
        if from == to {
            return Ok(());
        }
        let content = self.get_content(&from).await?;
        self.put_content(&to, content).await?;
        self.store.delete_file(&from).await
    }

    async fn copy_file(&self, from: &str, to: &str) -> VfsResult<()> {
        let content = self.get_content(from).await?;
        self.put_content(to, content).await
    }

    fn kind(&self) -> BackendKind {
        BackendKind::FlatStore
    }

    fn batch_ops(self: Arc<Self>) -> Option<Arc<dyn BatchOps>> {
        Some(self)
    }
}

/// Canonical key -> every input spelling that maps to it.
fn by_canonical(paths: &[String]) -> HashMap<String, Vec<&String>> {
    let mut wanted: HashMap<String, Vec<&String>> = HashMap::new();
    for p in paths {
        wanted.entry(path::normalize(p)).or_default().push(p);
    }
    wanted
}

#[async_trait]
impl BatchOps for FlatStoreBackend {
    async fn read_binary_batch(&self, paths: &[String]) -> VfsResult<HashMap<String, Vec<u8>>> {
        let wanted = by_canonical(paths);
        let keys: Vec<String> = wanted.keys().cloned().collect();

        let mut result = HashMap::with_capacity(paths.len());
        for record in self.store.get_files(&keys).await? {
            if let Some(originals) = wanted.get(&record.path) {
                let bytes = record.content.into_bytes();
                for original in originals {
                    result.insert((*original).clone(), bytes.clone());
                }
            }
        }
        Ok(result)
    }

    async fn existing_files(&self, paths: &[String]) -> VfsResult<HashSet<String>> {
        let wanted = by_canonical(paths);
        let keys: Vec<String> = wanted.keys().cloned().collect();

        let mut result = HashSet::with_capacity(paths.len());
        for key in self.store.existing_file_keys(&keys).await? {
            if let Some(originals) = wanted.get(&key) {
                result.extend(originals.iter().map(|p| (*p).clone()));
            }
        }
        Ok(result)
    }

    #[tracing::instrument(
        skip(self, entries, opts),
        fields(entries = entries.len()),
        name = "flat_store.write_batch"
    )]
    async fn write_binary_batch(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        opts: &BatchWriteOptions,
    ) -> VfsResult<()> {
        let total = entries.len();
        let entries: Vec<(String, Vec<u8>)> = entries
            .into_iter()
            .map(|(p, data)| (path::normalize(&p), data))
            .collect();

        for (p, _) in &entries {
            if p == path::ROOT {
                return Err(VfsError::invalid_operation("cannot write to the root directory"));
            }
        }

        let parents: BTreeSet<String> = entries
            .iter()
            .filter_map(|(p, _)| path::parent(p))
            .flat_map(|parent| path::ancestors(&parent))
            .collect();
        if let Some((p, _)) = entries.iter().find(|(p, _)| parents.contains(p)) {
            return Err(VfsError::invalid_operation(format!(
                "batch writes both a file and its children: {}",
                p
            )));
        }

        let keys: Vec<String> = entries.iter().map(|(p, _)| p.clone()).collect();
        if let Some(dir) = self.store.get_dirs(&keys).await?.into_iter().next() {
            return Err(VfsError::invalid_operation(format!(
                "is a directory: {}",
                dir.path
            )));
        }

        let parents: Vec<String> = parents.into_iter().collect();
        if opts.skip_parents {
            self.ensure_no_files(&parents).await?;
        } else {
            self.create_dirs(parents).await?;
        }

        let chunk_size = opts.chunk_size.unwrap_or(self.config.chunk_size).max(1);
        let mut completed = 0;
        for chunk in entries.chunks(chunk_size) {
            let keys: Vec<String> = chunk.iter().map(|(p, _)| p.clone()).collect();
            let ctimes: HashMap<String, std::time::SystemTime> = self
                .store
                .get_files(&keys)
                .await?
                .into_iter()
                .map(|record| (record.path, record.ctime))
                .collect();

            let records = chunk
                .iter()
                .map(|(p, data)| {
                    FileRecord::new(p.clone(), Content::from(data.clone()), ctimes.get(p).copied())
                })
                .collect();
            self.store.put_files(records).await?;

            completed += chunk.len();
            opts.report(completed, total);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::batch::BatchProgress;
    use mountvfs_types::FileKind;
    use parking_lot::Mutex;

    fn backend() -> FlatStoreBackend {
        FlatStoreBackend::in_memory()
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = backend();
        fs.write_file("/test.txt", "hello world").await.unwrap();
        assert_eq!(fs.read_file("/test.txt").await.unwrap(), "hello world");
        assert_eq!(fs.read_binary("/test.txt").await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_write_creates_ancestors() {
        let fs = backend();
        fs.write_file("/a/b/c/file.txt", "x").await.unwrap();

        assert!(fs.stat("/a").await.unwrap().is_directory());
        assert!(fs.stat("/a/b").await.unwrap().is_directory());
        assert!(fs.stat("/a/b/c").await.unwrap().is_directory());
        assert!(fs.stat("/a/b/c/file.txt").await.unwrap().is_file());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_ctime() {
        let fs = backend();
        fs.write_file("/f.txt", "one").await.unwrap();
        let first = fs.stat("/f.txt").await.unwrap();

        fs.write_file("/f.txt", "three").await.unwrap();
        let second = fs.stat("/f.txt").await.unwrap();

        assert_eq!(second.ctime, first.ctime);
        assert!(second.mtime >= first.mtime);
        assert_eq!(second.size, 5);
    }

    #[tokio::test]
    async fn test_write_to_root_is_invalid() {
        let fs = backend();
        let result = fs.write_file("/", "nope").await;
        assert!(matches!(result, Err(VfsError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn test_mkdir_creates_chain_and_is_idempotent() {
        let fs = backend();
        fs.mkdir("/a/b/c").await.unwrap();
        let ctime = fs.stat("/a/b").await.unwrap().ctime;

        fs.mkdir("/a/b/c").await.unwrap();
        assert!(fs.exists("/a").await);
        assert!(fs.exists("/a/b/c").await);
        assert_eq!(fs.stat("/a/b").await.unwrap().ctime, ctime);
    }

    #[tokio::test]
    async fn test_stat_missing_and_root() {
        let fs = backend();
        assert!(matches!(fs.stat("/nope").await, Err(VfsError::NotFound(_))));
        assert!(fs.stat("/").await.unwrap().is_directory());
        assert!(fs.exists("/").await);
    }

    #[tokio::test]
    async fn test_readdir_direct_children_only() {
        let fs = backend();
        fs.write_file("/dir/file.txt", "f").await.unwrap();
        fs.mkdir("/dir/sub/deeper").await.unwrap();
        fs.write_file("/dir/sub/inner.txt", "i").await.unwrap();
        fs.write_file("/dirt.txt", "sibling").await.unwrap();

        let entries = fs.readdir("/dir").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "sub");
        assert_eq!(entries[0].path, "/dir/sub");
        assert_eq!(entries[0].kind, FileKind::Directory);
        assert_eq!(entries[1].name, "file.txt");
        assert_eq!(entries[1].path, "/dir/file.txt");
        assert_eq!(entries[1].kind, FileKind::File);
    }

    #[tokio::test]
    async fn test_readdir_root() {
        let fs = backend();
        fs.write_file("/top.txt", "t").await.unwrap();
        fs.mkdir("/zdir/nested").await.unwrap();
        fs.mkdir("/adir").await.unwrap();

        let names: Vec<_> = fs
            .readdir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["adir", "zdir", "top.txt"]);
    }

    #[tokio::test]
    async fn test_readdir_missing_directory_is_empty() {
        let fs = backend();
        assert!(fs.readdir("/ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rmdir_recursive() {
        let fs = backend();
        fs.write_file("/tree/a.txt", "a").await.unwrap();
        fs.write_file("/tree/sub/b.txt", "b").await.unwrap();
        fs.mkdir("/tree/sub/empty").await.unwrap();
        fs.write_file("/keep.txt", "k").await.unwrap();

        fs.rmdir("/tree", true).await.unwrap();

        for p in ["/tree", "/tree/a.txt", "/tree/sub", "/tree/sub/b.txt", "/tree/sub/empty"] {
            assert!(!fs.exists(p).await, "{} should be gone", p);
        }
        assert!(fs.exists("/keep.txt").await);
    }

    #[tokio::test]
    async fn test_rmdir_non_recursive_leaves_children() {
        let fs = backend();
        fs.write_file("/d/child.txt", "c").await.unwrap();
        fs.rmdir("/d", false).await.unwrap();

        assert!(!fs.exists("/d").await);
        assert_eq!(fs.read_file("/d/child.txt").await.unwrap(), "c");
    }

    #[tokio::test]
    async fn test_rename_file() {
        let fs = backend();
        fs.write_file("/old.txt", "content").await.unwrap();
        fs.rename("/old.txt", "/moved/new.txt").await.unwrap();

        assert!(!fs.exists("/old.txt").await);
        assert_eq!(fs.read_file("/moved/new.txt").await.unwrap(), "content");
    }

    #[tokio::test]
    async fn test_rename_directory_is_invalid() {
        let fs = backend();
        fs.mkdir("/dir").await.unwrap();
        let result = fs.rename("/dir", "/other").await;
        assert!(matches!(result, Err(VfsError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn test_rename_missing_is_not_found() {
        let fs = backend();
        assert!(matches!(fs.rename("/a", "/b").await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_preserves_text() {
        let fs = backend();
        fs.write_file("/src.txt", "same").await.unwrap();
        fs.copy_file("/src.txt", "/dst/copy.txt").await.unwrap();

        assert_eq!(fs.read_file("/src.txt").await.unwrap(), "same");
        assert_eq!(fs.read_file("/dst/copy.txt").await.unwrap(), "same");
    }

    #[tokio::test]
    async fn test_read_binary_as_text_requires_utf8() {
        let fs = backend();
        fs.write_binary("/bad.bin", &[0xff, 0x00]).await.unwrap();
        assert!(matches!(
            fs.read_file("/bad.bin").await,
            Err(VfsError::InvalidOperation(_))
        ));
        assert_eq!(fs.read_binary("/bad.bin").await.unwrap(), [0xff, 0x00]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let fs = backend();
        fs.write_file("/x", "x").await.unwrap();
        fs.delete_file("/x").await.unwrap();
        fs.delete_file("/x").await.unwrap();
        assert!(!fs.exists("/x").await);
    }

    #[tokio::test]
    async fn test_read_batch_is_lenient() {
        let fs = backend();
        fs.write_binary("/a.bin", b"aaa").await.unwrap();

        let result = fs
            .read_binary_batch(&["/a.bin".to_string(), "/missing.bin".to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result["/a.bin"], b"aaa");
    }

    #[tokio::test]
    async fn test_write_batch_chunks_and_progress() {
        let fs = backend();
        let progress = Arc::new(Mutex::new(Vec::new()));
        let progress_cb = progress.clone();
        let opts = BatchWriteOptions {
            chunk_size: Some(2),
            skip_parents: false,
            on_progress: Some(Arc::new(move |p: BatchProgress| {
                progress_cb.lock().push(p.completed)
            })),
        };

        let entries = (0..5)
            .map(|i| (format!("/batch/n{}/f{}.bin", i % 2, i), vec![i as u8]))
            .collect();
        fs.write_binary_batch(entries, &opts).await.unwrap();

        assert_eq!(*progress.lock(), [2, 4, 5]);
        assert!(fs.stat("/batch/n0").await.unwrap().is_directory());
        assert!(fs.stat("/batch/n1").await.unwrap().is_directory());
        assert_eq!(fs.read_binary("/batch/n0/f4.bin").await.unwrap(), [4]);
        assert_eq!(fs.readdir("/batch").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_batch_skip_parents() {
        let fs = backend();
        let opts = BatchWriteOptions {
            skip_parents: true,
            ..Default::default()
        };
        fs.write_binary_batch(vec![("/p/q.bin".to_string(), vec![1])], &opts)
            .await
            .unwrap();

        assert!(!fs.exists("/p").await);
        assert_eq!(fs.read_binary("/p/q.bin").await.unwrap(), [1]);
    }

    #[tokio::test]
    async fn test_file_and_directory_are_exclusive() {
        let fs = backend();
        fs.write_file("/f", "data").await.unwrap();
        assert!(matches!(
            fs.write_file("/f/child", "x").await,
            Err(VfsError::InvalidOperation(_))
        ));
        assert!(matches!(fs.mkdir("/f").await, Err(VfsError::InvalidOperation(_))));
        assert!(fs.stat("/f").await.unwrap().is_file());
        assert!(fs.readdir("/f").await.unwrap().is_empty());

        fs.mkdir("/d").await.unwrap();
        assert!(matches!(
            fs.write_file("/d", "x").await,
            Err(VfsError::InvalidOperation(_))
        ));
        assert!(matches!(fs.read_file("/d").await, Err(VfsError::InvalidOperation(_))));
        assert!(fs.stat("/d").await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn test_write_batch_refuses_kind_conflicts() {
        let fs = backend();
        fs.write_file("/file", "f").await.unwrap();
        fs.mkdir("/dir").await.unwrap();
        let opts = BatchWriteOptions::default();

        for entries in [
            vec![("/dir".to_string(), vec![1])],
            vec![("/file/under".to_string(), vec![1])],
            vec![("/x".to_string(), vec![1]), ("/x/y".to_string(), vec![2])],
        ] {
            let result = fs.write_binary_batch(entries, &opts).await;
            assert!(matches!(result, Err(VfsError::InvalidOperation(_))));
        }

        let skip = BatchWriteOptions {
            skip_parents: true,
            ..Default::default()
        };
        let result = fs
            .write_binary_batch(vec![("/file/under".to_string(), vec![1])], &skip)
            .await;
        assert!(matches!(result, Err(VfsError::InvalidOperation(_))));

        assert!(!fs.exists("/x").await);
        assert_eq!(fs.read_file("/file").await.unwrap(), "f");
    }

    #[tokio::test]
    async fn test_existing_files_keeps_input_spelling() {
        let fs = backend();
        fs.write_file("/a/b.txt", "b").await.unwrap();
        fs.mkdir("/a/dir").await.unwrap();

        let found = fs
            .existing_files(&[
                "/a/b.txt".to_string(),
                "a//b.txt".to_string(),
                "/a/dir".to_string(),
                "/a/none".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains("/a/b.txt"));
        assert!(found.contains("a//b.txt"));
    }
}
