//! Local filesystem backend.
//!
//! The native-handle backend: the host filesystem already has directories,
//! so every operation delegates to `tokio::fs`. Virtual paths are joined
//! onto a root directory and may not climb out of it.

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use mountvfs_types::{BackendKind, FileEntry, FileStats, sort_entries};

use crate::vfs::ops::StorageBackend;
use crate::vfs::path;
use crate::vfs::{VfsError, VfsResult};

/// Local filesystem backend rooted at a host directory.
///
/// If `root` is `/srv/data`, then `read_file("/notes/a.txt")` reads
/// `/srv/data/notes/a.txt`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at the given host directory.
    ///
    /// The root is canonicalized when it exists, so later prefix checks see
    /// the same spelling the OS reports.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to a host path under the root.
    ///
    /// `..` segments are rejected outright; `.` segments are dropped. The
    /// result must also stay under the root once symlinks are resolved.
    fn resolve(&self, virtual_path: &str) -> VfsResult<PathBuf> {
        let normalized = path::normalize(virtual_path);
        let relative = Path::new(normalized.trim_start_matches('/'));

        let mut full = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(s) => full.push(s),
                Component::CurDir => {}
                _ => {
                    return Err(VfsError::invalid_operation(format!(
                        "path escapes root: {}",
                        normalized
                    )));
                }
            }
        }
        self.check_contained(&full, &normalized)?;
        Ok(full)
    }

    /// Reject host paths that leave the root through a symlink.
    ///
    /// The deepest entry that exists on the way to `full` is canonicalized
    /// and must land under the canonical root. A dangling link counts as an
    /// escape.
    fn check_contained(&self, full: &Path, normalized: &str) -> VfsResult<()> {
        let Some(existing) = full
            .ancestors()
            .take_while(|p| p.starts_with(&self.root))
            .find(|p| p.symlink_metadata().is_ok())
        else {
            return Ok(());
        };

        let canonical_root =
            dunce::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let escapes = match dunce::canonicalize(existing) {
            Ok(canonical) => !canonical.starts_with(&canonical_root),
            Err(_) => true,
        };
        if escapes {
            return Err(VfsError::invalid_operation(format!(
                "path escapes root: {}",
                normalized
            )));
        }
        Ok(())
    }

    /// Host path for a write target; the root itself is not writable.
    fn resolve_file(&self, virtual_path: &str) -> VfsResult<PathBuf> {
        if path::is_root(virtual_path) {
            return Err(VfsError::invalid_operation("cannot write to the root directory"));
        }
        self.resolve(virtual_path)
    }

    async fn ensure_parent(virtual_path: &str, full: &Path) -> VfsResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(virtual_path, e))?;
        }
        Ok(())
    }

    /// Convert std::fs::Metadata to FileStats.
    fn metadata_to_stats(meta: &std::fs::Metadata) -> FileStats {
        let mtime = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
        if meta.is_dir() {
            FileStats {
                ctime: meta.created().ok(),
                ..FileStats::directory(mtime)
            }
        } else {
            FileStats::file(meta.len(), mtime, meta.created().ok())
        }
    }
}

/// Host errors carry the virtual path. NotFound stays NotFound; a file
/// standing where a directory is needed (or the reverse) is an
/// InvalidOperation, the same as on the flat store.
fn map_io(virtual_path: &str, err: io::Error) -> VfsError {
    match err.kind() {
        io::ErrorKind::NotFound => VfsError::not_found(path::normalize(virtual_path)),
        io::ErrorKind::AlreadyExists
        | io::ErrorKind::NotADirectory
        | io::ErrorKind::IsADirectory => VfsError::invalid_operation(format!(
            "{}: {}",
            err,
            path::normalize(virtual_path)
        )),
        _ => VfsError::Io(err),
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn read_file(&self, path: &str) -> VfsResult<String> {
        let full = self.resolve(path)?;
        let bytes = fs::read(&full).await.map_err(|e| map_io(path, e))?;
        String::from_utf8(bytes)
            .map_err(|_| VfsError::invalid_operation(format!("not valid UTF-8: {}", path)))
    }

    async fn read_binary(&self, path: &str) -> VfsResult<Vec<u8>> {
        let full = self.resolve(path)?;
        fs::read(&full).await.map_err(|e| map_io(path, e))
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => fs::try_exists(&full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn stat(&self, path: &str) -> VfsResult<FileStats> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(|e| map_io(path, e))?;
        Ok(Self::metadata_to_stats(&meta))
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<FileEntry>> {
        let normalized = path::normalize(path);
        let full = self.resolve(&normalized)?;
        let mut dir = match fs::read_dir(&full).await {
            Ok(dir) => dir,
            // Same as the flat store: a missing directory, or a file, lists
            // as empty.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(VfsError::Io(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = path::join(&normalized, &name);
            if entry.file_type().await?.is_dir() {
                entries.push(FileEntry::directory(name, child));
            } else {
                entries.push(FileEntry::file(name, child));
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn write_file(&self, path: &str, content: &str) -> VfsResult<()> {
        self.write_binary(path, content.as_bytes()).await
    }

    async fn write_binary(&self, path: &str, content: &[u8]) -> VfsResult<()> {
        let full = self.resolve_file(path)?;
        Self::ensure_parent(path, &full).await?;
        fs::write(&full, content)
            .await
            .map_err(|e| map_io(path, e))?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> VfsResult<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(VfsError::Io(e)),
            _ => Ok(()),
        }
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        Ok(())
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
        if path::is_root(path) {
            return Err(VfsError::invalid_operation("cannot remove the backend root"));
        }
        let full = self.resolve(path)?;
        let result = if recursive {
            fs::remove_dir_all(&full).await
        } else {
            // The host refuses to drop a non-empty directory here.
            fs::remove_dir(&full).await
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(VfsError::Io(e)),
            _ => Ok(()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_full = self.resolve(from)?;
        let to_full = self.resolve_file(to)?;

        let meta = fs::metadata(&from_full).await.map_err(|e| map_io(from, e))?;
        if meta.is_dir() {
            return Err(VfsError::invalid_operation(format!(
                "cannot rename directory: {}",
                path::normalize(from)
            )));
        }

        Self::ensure_parent(to, &to_full).await?;
        fs::rename(&from_full, &to_full)
            .await
            .map_err(|e| map_io(to, e))?;
        Ok(())
    }

    async fn copy_file(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_full = self.resolve(from)?;
        let to_full = self.resolve_file(to)?;
        Self::ensure_parent(to, &to_full).await?;
        fs::copy(&from_full, &to_full)
            .await
            .map_err(|e| map_io(from, e))?;
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }
}
