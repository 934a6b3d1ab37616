//! The virtual filesystem service.
//!
//! [`VirtualFs`] owns a [`MountTable`] and an [`EventBus`]. Every operation
//! resolves its path once, delegates to the mounted backend, and on success
//! tells subscribers what changed.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

use mountvfs_types::{BackendKind, FileEntry, FileStats, VfsEvent};

use super::backends::open_backend;
use super::batch::{BatchOptions, BatchProgress, BatchWriteOptions, ProgressFn};
use super::events::{EventBus, Subscription};
use super::mount::{MountInfo, MountTable, ResolvedPath};
use super::ops::StorageBackend;
use super::{VfsError, VfsResult};
use crate::config::{AutoMount, BackendConfig, VfsConfig};

/// One batch entry after resolution.
struct BatchItem<T> {
    /// Path exactly as the caller gave it.
    original: String,
    /// Canonical virtual path.
    path: String,
    /// Path relative to the backend.
    relative: String,
    payload: T,
}

/// Resolved entries that share one backend instance.
struct Group<T> {
    target: ResolvedPath,
    items: Vec<BatchItem<T>>,
}

impl<T> Group<T> {
    fn relatives(&self) -> Vec<String> {
        self.items.iter().map(|item| item.relative.clone()).collect()
    }
}

/// Bucket items by backend identity, keeping first-seen order.
fn group_by_backend<T>(
    items: impl IntoIterator<Item = (ResolvedPath, String, T)>,
) -> Vec<Group<T>> {
    let mut index: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Group<T>> = Vec::new();
    for (resolved, original, payload) in items {
        let slot = *index.entry(resolved.backend_id()).or_insert_with(|| {
            groups.push(Group {
                target: resolved.clone(),
                items: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].items.push(BatchItem {
            original,
            path: resolved.path,
            relative: resolved.relative,
            payload,
        });
    }
    groups
}

/// Mount-based virtual filesystem.
///
/// ```ignore
/// let vfs = VirtualFs::new();
/// vfs.mount("/", FlatStoreBackend::in_memory());
/// vfs.mount("/src", LocalBackend::new("/home/me/src"));
///
/// vfs.write_file("/notes/today.md", "hello").await?;
/// let entries = vfs.readdir("/notes").await?;
/// ```
pub struct VirtualFs {
    mounts: MountTable,
    events: EventBus,
    config: VfsConfig,
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VirtualFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFs")
            .field("mounts", &self.mounts)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl VirtualFs {
    /// Create a service with no mounts and default tuning.
    pub fn new() -> Self {
        Self::with_config(VfsConfig::default())
    }

    /// Create a service with the given tuning. Configured mounts are not
    /// applied; use [`from_config`](Self::from_config) for that.
    pub fn with_config(config: VfsConfig) -> Self {
        Self {
            mounts: MountTable::new(),
            events: EventBus::new(),
            config,
        }
    }

    /// Create a service and mount everything the config lists, in order.
    pub async fn from_config(config: &VfsConfig) -> VfsResult<Self> {
        let vfs = Self::with_config(config.clone());
        for mount in &config.mounts {
            let backend = open_backend(&mount.backend, &config.flat_store).await?;
            vfs.mounts.mount_arc(&mount.path, backend);
        }
        tracing::debug!(mounts = config.mounts.len(), "virtual filesystem configured");
        Ok(vfs)
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    // ========================================================================
    // Mounts
    // ========================================================================

    /// Mount a backend, replacing whatever was mounted at exactly `path`.
    pub fn mount(&self, path: &str, backend: impl StorageBackend + 'static) {
        self.mounts.mount(path, backend);
    }

    /// Mount a shared backend. Mounting one instance at several paths makes
    /// them the same backend for rename and copy.
    pub fn mount_arc(&self, path: &str, backend: Arc<dyn StorageBackend>) {
        self.mounts.mount_arc(path, backend);
    }

    /// Mount the best engine available among the candidates.
    pub async fn mount_auto(&self, path: &str, auto: AutoMount) -> VfsResult<BackendKind> {
        let backend = open_backend(&BackendConfig::from(auto), &self.config.flat_store).await?;
        let kind = backend.kind();
        self.mounts.mount_arc(path, backend);
        Ok(kind)
    }

    /// Remove the mount at exactly `path`. The backend's data is untouched.
    pub fn unmount(&self, path: &str) -> bool {
        self.mounts.unmount(path)
    }

    /// Current mounts, most specific first.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts.list_mounts()
    }

    /// Returns true if a backend is mounted at exactly `path`.
    pub fn is_mounted(&self, path: &str) -> bool {
        self.mounts.is_mounted(path)
    }

    /// Engine family serving `path`, if any mount covers it.
    pub fn backend_type(&self, path: &str) -> Option<BackendKind> {
        self.mounts.resolve(path).ok().map(|r| r.backend.kind())
    }

    /// Route a virtual path to its backend.
    pub fn resolve(&self, path: &str) -> VfsResult<ResolvedPath> {
        self.mounts.resolve(path)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Register a change handler.
    pub fn subscribe(&self, handler: impl Fn(&VfsEvent) + Send + Sync + 'static) -> Subscription {
        self.events.subscribe(handler)
    }

    fn emit(&self, event: VfsEvent) {
        self.events.emit(&event);
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub async fn read_file(&self, path: &str) -> VfsResult<String> {
        let r = self.resolve(path)?;
        r.backend.read_file(&r.relative).await
    }

    pub async fn read_binary(&self, path: &str) -> VfsResult<Vec<u8>> {
        let r = self.resolve(path)?;
        r.backend.read_binary(&r.relative).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> VfsResult<()> {
        let r = self.resolve(path)?;
        let existed = r.backend.exists(&r.relative).await;
        r.backend.write_file(&r.relative, content).await?;
        self.emit(VfsEvent::file_written(r.path, existed));
        Ok(())
    }

    pub async fn write_binary(&self, path: &str, content: &[u8]) -> VfsResult<()> {
        let r = self.resolve(path)?;
        let existed = r.backend.exists(&r.relative).await;
        r.backend.write_binary(&r.relative, content).await?;
        self.emit(VfsEvent::file_written(r.path, existed));
        Ok(())
    }

    /// Delete a file. A missing file is not an error and emits nothing.
    pub async fn delete_file(&self, path: &str) -> VfsResult<()> {
        let r = self.resolve(path)?;
        let existed = matches!(r.backend.stat(&r.relative).await, Ok(s) if s.is_file());
        r.backend.delete_file(&r.relative).await?;
        if existed {
            self.emit(VfsEvent::FileDeleted { path: r.path });
        }
        Ok(())
    }

    /// Returns false for unmounted paths rather than failing.
    pub async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(r) => r.backend.exists(&r.relative).await,
            Err(_) => false,
        }
    }

    pub async fn stat(&self, path: &str) -> VfsResult<FileStats> {
        let r = self.resolve(path)?;
        r.backend.stat(&r.relative).await
    }

    // ========================================================================
    // Directories
    // ========================================================================

    pub async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let r = self.resolve(path)?;
        r.backend.mkdir(&r.relative).await?;
        self.emit(VfsEvent::DirectoryCreated { path: r.path });
        Ok(())
    }

    pub async fn rmdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let r = self.resolve(path)?;
        r.backend.rmdir(&r.relative, recursive).await?;
        self.emit(VfsEvent::DirectoryDeleted { path: r.path });
        Ok(())
    }

    /// List a directory. Entry paths are absolute virtual paths.
    pub async fn readdir(&self, path: &str) -> VfsResult<Vec<FileEntry>> {
        let r = self.resolve(path)?;
        let mut entries = r.backend.readdir(&r.relative).await?;
        for entry in &mut entries {
            entry.path = r.to_virtual(&entry.path);
        }
        Ok(entries)
    }

    // ========================================================================
    // Rename / copy
    // ========================================================================

    /// Move a file. Within one backend this is the backend's own rename;
    /// across backends it is read, write, then delete, and is not atomic.
    pub async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;

        if src.same_backend(&dst) {
            src.backend.rename(&src.relative, &dst.relative).await?;
        } else {
            let stats = src.backend.stat(&src.relative).await?;
            if stats.is_directory() {
                return Err(VfsError::invalid_operation(format!(
                    "cannot rename directory: {}",
                    src.path
                )));
            }
            let data = src.backend.read_binary(&src.relative).await?;
            dst.backend.write_binary(&dst.relative, &data).await?;
            src.backend.delete_file(&src.relative).await?;
        }

        if src.path != dst.path {
            self.emit(VfsEvent::FileDeleted { path: src.path });
            self.emit(VfsEvent::FileCreated { path: dst.path });
        }
        Ok(())
    }

    pub async fn copy_file(&self, from: &str, to: &str) -> VfsResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        let existed = dst.backend.exists(&dst.relative).await;

        if src.same_backend(&dst) {
            src.backend.copy_file(&src.relative, &dst.relative).await?;
        } else {
            let data = src.backend.read_binary(&src.relative).await?;
            dst.backend.write_binary(&dst.relative, &data).await?;
        }

        self.emit(VfsEvent::file_written(dst.path, existed));
        Ok(())
    }

    // ========================================================================
    // Batch
    // ========================================================================

    /// Resolve every path, dropping the ones no mount covers.
    fn resolve_all<T>(
        &self,
        items: impl IntoIterator<Item = (String, T)>,
    ) -> Vec<(ResolvedPath, String, T)> {
        items
            .into_iter()
            .filter_map(|(p, payload)| match self.resolve(&p) {
                Ok(r) => Some((r, p, payload)),
                Err(e) => {
                    tracing::debug!(path = %p, error = %e, "skipping unresolvable batch path");
                    None
                }
            })
            .collect()
    }

    fn fanout_width(&self, opts: Option<&BatchOptions>) -> usize {
        opts.and_then(|o| o.concurrency)
            .unwrap_or(self.config.fanout_concurrency)
            .max(1)
    }

    /// Read many files at once.
    ///
    /// Results are keyed by the path as given. Missing, unreadable and
    /// unmounted paths are left out.
    #[tracing::instrument(skip(self, paths), fields(paths = paths.len()), name = "vfs.read_batch")]
    pub async fn read_binary_batch(
        &self,
        paths: &[String],
    ) -> VfsResult<HashMap<String, Vec<u8>>> {
        let resolved = self.resolve_all(paths.iter().map(|p| (p.clone(), ())));
        let width = self.fanout_width(None);
        let mut result = HashMap::with_capacity(resolved.len());

        for group in group_by_backend(resolved) {
            if let Some(batch) = &group.target.batch {
                let found = batch.read_binary_batch(&group.relatives()).await?;
                for item in group.items {
                    if let Some(data) = found.get(&item.relative) {
                        result.insert(item.original, data.clone());
                    }
                }
                continue;
            }

            let backend = &group.target.backend;
            for chunk in group.items.chunks(width) {
                let reads = chunk
                    .iter()
                    .map(|item| async move { (item, backend.read_binary(&item.relative).await) });
                for (item, outcome) in join_all(reads).await {
                    match outcome {
                        Ok(data) => {
                            result.insert(item.original.clone(), data);
                        }
                        Err(e) => {
                            tracing::debug!(
                                path = %item.original,
                                error = %e,
                                "batch read skipped path"
                            );
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    /// Write many files at once.
    ///
    /// Entries are grouped by backend. Backends with native batch support
    /// take one call per group; the rest get `concurrency` writes in flight
    /// at a time. The first failure stops all remaining work. Progress is
    /// reported across every group.
    #[tracing::instrument(
        skip(self, entries, opts),
        fields(entries = entries.len()),
        name = "vfs.write_batch"
    )]
    pub async fn write_binary_batch(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        opts: BatchOptions,
    ) -> VfsResult<()> {
        let resolved = self.resolve_all(entries);
        let total = resolved.len();
        let width = self.fanout_width(Some(&opts));
        let mut done = 0;

        for group in group_by_backend(resolved) {
            let existed = if opts.silent {
                Vec::new()
            } else {
                self.existing(&group, width).await?
            };
            let count = group.items.len();
            let backend = &group.target.backend;

            if let Some(batch) = &group.target.batch {
                let offset = done;
                let on_progress = opts.on_progress.clone().map(|f| {
                    Arc::new(move |p: BatchProgress| {
                        f(BatchProgress::new(offset + p.completed, total))
                    }) as ProgressFn
                });
                let write_opts = BatchWriteOptions {
                    chunk_size: opts.concurrency,
                    skip_parents: !opts.create_parents,
                    on_progress,
                };
                let writes: Vec<(String, Vec<u8>)> = group
                    .items
                    .iter()
                    .map(|item| (item.relative.clone(), item.payload.clone()))
                    .collect();
                batch.write_binary_batch(writes, &write_opts).await?;
            } else {
                let mut completed = 0;
                for chunk in group.items.chunks(width) {
                    let writes = chunk
                        .iter()
                        .map(|item| backend.write_binary(&item.relative, &item.payload));
                    for outcome in join_all(writes).await {
                        outcome?;
                    }
                    completed += chunk.len();
                    if let Some(f) = &opts.on_progress {
                        f(BatchProgress::new(done + completed, total));
                    }
                }
            }
            done += count;

            if !opts.silent {
                for (item, existed) in group.items.iter().zip(existed) {
                    self.emit(VfsEvent::file_written(item.path.clone(), existed));
                }
            }
        }

        tracing::debug!(written = done, "batch write complete");
        Ok(())
    }

    /// Which of a group's paths already hold a file, in item order.
    async fn existing<T>(&self, group: &Group<T>, width: usize) -> VfsResult<Vec<bool>> {
        if let Some(batch) = &group.target.batch {
            let relatives = group.relatives();
            let found = batch.existing_files(&relatives).await?;
            return Ok(relatives.iter().map(|rel| found.contains(rel)).collect());
        }

        let backend = &group.target.backend;
        let mut existed = Vec::with_capacity(group.items.len());
        for chunk in group.items.chunks(width) {
            let checks = chunk.iter().map(|item| backend.exists(&item.relative));
            existed.extend(join_all(checks).await);
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::FlatStoreBackend;

    #[test]
    fn test_group_by_backend_keeps_first_seen_order() {
        let vfs = VirtualFs::new();
        let shared: Arc<dyn StorageBackend> = Arc::new(FlatStoreBackend::in_memory());
        vfs.mount_arc("/a", shared.clone());
        vfs.mount_arc("/b", shared);
        vfs.mount("/c", FlatStoreBackend::in_memory());

        let items = vfs.resolve_all(
            ["/c/1", "/a/2", "/missing/3", "/b/4", "/c/5"]
                .into_iter()
                .map(|p| (p.to_string(), ())),
        );
        assert_eq!(items.len(), 4);

        let groups = group_by_backend(items);
        assert_eq!(groups.len(), 2);
        let originals: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.items.iter().map(|item| item.original.as_str()).collect())
            .collect();
        assert_eq!(originals, [vec!["/c/1", "/c/5"], vec!["/a/2", "/b/4"]]);
        assert_eq!(groups[1].items[1].relative, "/4");
        assert_eq!(groups[1].items[1].path, "/b/4");
    }

    #[test]
    fn test_fanout_width() {
        let vfs = VirtualFs::new();
        assert_eq!(vfs.fanout_width(None), 10);
        assert_eq!(vfs.fanout_width(Some(&BatchOptions::new().with_concurrency(0))), 1);
        assert_eq!(vfs.fanout_width(Some(&BatchOptions::new().with_concurrency(3))), 3);
    }
}
