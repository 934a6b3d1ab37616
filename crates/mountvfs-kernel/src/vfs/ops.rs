//! Storage backend contract.
//!
//! Every storage engine mounted into a [`VirtualFs`](super::VirtualFs)
//! implements [`StorageBackend`]. Paths handed to a backend are relative to
//! its mount point but still canonical (`/` is the backend's own root), and
//! every implementation normalizes again on entry.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mountvfs_types::{BackendKind, FileEntry, FileStats};

use super::VfsResult;
use super::batch::BatchWriteOptions;

/// Core backend operations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Read a file as text. Fails with NotFound if absent.
    async fn read_file(&self, path: &str) -> VfsResult<String>;

    /// Read a file as bytes. Fails with NotFound if absent.
    async fn read_binary(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Returns true if a file or directory exists at `path`. Never errors.
    async fn exists(&self, path: &str) -> bool;

    /// Get metadata. Fails with NotFound if absent.
    async fn stat(&self, path: &str) -> VfsResult<FileStats>;

    /// List the direct children of a directory.
    ///
    /// Directories come first, then files, each group ordered by name.
    /// Entry paths are relative to this backend.
    async fn readdir(&self, path: &str) -> VfsResult<Vec<FileEntry>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write text, replacing any existing content. Missing ancestor
    /// directories are created.
    async fn write_file(&self, path: &str, content: &str) -> VfsResult<()>;

    /// Write bytes, replacing any existing content. Missing ancestor
    /// directories are created.
    async fn write_binary(&self, path: &str, content: &[u8]) -> VfsResult<()>;

    /// Delete a file. Deleting a missing file succeeds.
    async fn delete_file(&self, path: &str) -> VfsResult<()>;

    /// Create a directory and every missing ancestor. Idempotent.
    async fn mkdir(&self, path: &str) -> VfsResult<()>;

    /// Remove a directory, and with `recursive` everything beneath it.
    async fn rmdir(&self, path: &str, recursive: bool) -> VfsResult<()>;

    /// Rename a single file. Fails with InvalidOperation when `from` is a
    /// directory: directories only move by recursive copy.
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Copy a single file.
    async fn copy_file(&self, from: &str, to: &str) -> VfsResult<()>;

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Which family of engine this is.
    fn kind(&self) -> BackendKind;

    /// Native batch support, if any.
    ///
    /// Queried once when the backend is mounted; the answer is stored with
    /// the mount rather than probed per call.
    fn batch_ops(self: Arc<Self>) -> Option<Arc<dyn BatchOps>> {
        None
    }
}

/// Optional batch extension for engines that can amortize transaction cost.
#[async_trait]
pub trait BatchOps: Send + Sync {
    /// Read many files through one read view.
    ///
    /// Paths that do not resolve to a file are omitted from the result.
    async fn read_binary_batch(&self, paths: &[String]) -> VfsResult<HashMap<String, Vec<u8>>>;

    /// Which of `paths` currently hold a file, without loading content.
    ///
    /// Returned entries use the spelling they were given in.
    async fn existing_files(&self, paths: &[String]) -> VfsResult<HashSet<String>>;

    /// Write many files, committing in chunks and reporting progress after
    /// each one. The first failed chunk aborts the rest.
    async fn write_binary_batch(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        opts: &BatchWriteOptions,
    ) -> VfsResult<()>;
}
