//! VFS mount table with longest-prefix routing.
//!
//! Mounts are kept sorted by mount path length, longest first, so the first
//! structural match is always the most specific one. Matching is done on
//! whole segments: `/data/` never claims `/database`.

use parking_lot::RwLock;
use std::sync::Arc;

use mountvfs_types::BackendKind;

use super::error::{VfsError, VfsResult};
use super::ops::{BatchOps, StorageBackend};
use super::path;

/// A backend bound to a path prefix.
#[derive(Clone)]
struct Mount {
    /// Canonical path with trailing slash (`/` for the root mount).
    mount_path: String,
    backend: Arc<dyn StorageBackend>,
    /// Batch capability, captured once at mount time.
    batch: Option<Arc<dyn BatchOps>>,
}

impl Mount {
    /// Backend-relative path for `normalized`, if this mount covers it.
    fn relative(&self, normalized: &str) -> Option<String> {
        let with_slash = path::mount_path(normalized);
        if with_slash.starts_with(&self.mount_path) {
            Some(path::normalize(&with_slash[self.mount_path.len() - 1..]))
        } else {
            None
        }
    }
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Canonical mount path with trailing slash (e.g. `/data/`).
    pub mount_path: String,
    /// Engine family of the mounted backend.
    pub kind: BackendKind,
    /// Whether the backend has native batch support.
    pub batch: bool,
}

/// A virtual path routed to its backend.
#[derive(Clone)]
pub struct ResolvedPath {
    pub backend: Arc<dyn StorageBackend>,
    pub batch: Option<Arc<dyn BatchOps>>,
    /// Path relative to the backend, canonical.
    pub relative: String,
    /// The canonical virtual path that was resolved.
    pub path: String,
    /// Mount path of the matching mount, with trailing slash.
    pub mount_path: String,
}

impl ResolvedPath {
    /// Map a backend-relative path back into the virtual tree.
    pub fn to_virtual(&self, relative: &str) -> String {
        path::join(&self.mount_path, relative)
    }

    /// Returns true when both paths land on the same backend instance.
    pub fn same_backend(&self, other: &ResolvedPath) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }

    /// Identity of the backend instance, for grouping.
    pub(crate) fn backend_id(&self) -> usize {
        Arc::as_ptr(&self.backend) as *const () as usize
    }
}

impl std::fmt::Debug for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPath")
            .field("path", &self.path)
            .field("mount_path", &self.mount_path)
            .field("relative", &self.relative)
            .field("kind", &self.backend.kind())
            .finish()
    }
}

/// Routes virtual paths to mounted backends.
///
/// For example, if `/mnt` and `/mnt/project` are both mounted, a path like
/// `/mnt/project/src/main.rs` routes to the `/mnt/project` mount.
///
/// The table is mutated synchronously under a lock that is never held across
/// an await, so lookups never observe a half-applied mount.
#[derive(Default)]
pub struct MountTable {
    mounts: RwLock<Vec<Mount>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &self.list_mounts())
            .finish()
    }
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a backend at the given path.
    ///
    /// If a backend is already mounted at this exact path, it is replaced.
    pub fn mount(&self, path: &str, backend: impl StorageBackend + 'static) {
        self.mount_arc(path, Arc::new(backend));
    }

    /// Mount a backend (already wrapped in Arc) at the given path.
    pub fn mount_arc(&self, path: &str, backend: Arc<dyn StorageBackend>) {
        let mount_path = path::mount_path(path);
        let batch = Arc::clone(&backend).batch_ops();
        tracing::debug!(
            mount = %mount_path,
            kind = %backend.kind(),
            batch = batch.is_some(),
            "mounting backend"
        );

        let mut mounts = self.mounts.write();
        mounts.retain(|m| m.mount_path != mount_path);
        mounts.push(Mount {
            mount_path,
            backend,
            batch,
        });
        mounts.sort_by(|a, b| b.mount_path.len().cmp(&a.mount_path.len()));
    }

    /// Unmount the backend at the given path.
    ///
    /// Returns `true` if a mount was removed. The backend's stored records
    /// are untouched.
    pub fn unmount(&self, path: &str) -> bool {
        let mount_path = path::mount_path(path);
        let mut mounts = self.mounts.write();
        let before = mounts.len();
        mounts.retain(|m| m.mount_path != mount_path);
        let removed = mounts.len() != before;
        if removed {
            tracing::debug!(mount = %mount_path, "unmounted backend");
        }
        removed
    }

    /// Returns true if a backend is mounted at exactly this path.
    pub fn is_mounted(&self, path: &str) -> bool {
        let mount_path = path::mount_path(path);
        self.mounts.read().iter().any(|m| m.mount_path == mount_path)
    }

    /// List all current mounts, most specific first.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .read()
            .iter()
            .map(|m| MountInfo {
                mount_path: m.mount_path.clone(),
                kind: m.backend.kind(),
                batch: m.batch.is_some(),
            })
            .collect()
    }

    /// Find the mount for a path.
    ///
    /// Fails with NoMountPoint when nothing matches, including an empty
    /// table asked about `/`.
    pub fn resolve(&self, path: &str) -> VfsResult<ResolvedPath> {
        let normalized = path::normalize(path);
        let mounts = self.mounts.read();
        for mount in mounts.iter() {
            if let Some(relative) = mount.relative(&normalized) {
                tracing::trace!(
                    path = %normalized,
                    mount = %mount.mount_path,
                    %relative,
                    "resolved"
                );
                return Ok(ResolvedPath {
                    backend: Arc::clone(&mount.backend),
                    batch: mount.batch.clone(),
                    relative,
                    path: normalized,
                    mount_path: mount.mount_path.clone(),
                });
            }
        }
        Err(VfsError::no_mount_point(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::{FlatStoreBackend, LocalBackend};

    #[test]
    fn test_resolve_relative_paths() {
        let table = MountTable::new();
        table.mount("/data", FlatStoreBackend::in_memory());

        let r = table.resolve("/data/x/y.txt").unwrap();
        assert_eq!(r.relative, "/x/y.txt");
        assert_eq!(r.path, "/data/x/y.txt");
        assert_eq!(r.mount_path, "/data/");

        // The mount root itself resolves to the backend root.
        assert_eq!(table.resolve("/data").unwrap().relative, "/");
        assert_eq!(table.resolve("data//").unwrap().relative, "/");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = MountTable::new();
        let outer = Arc::new(FlatStoreBackend::in_memory());
        let inner = Arc::new(FlatStoreBackend::in_memory());
        table.mount_arc("/a", outer.clone());
        table.mount_arc("/a/b", inner.clone());

        let r = table.resolve("/a/b/x").unwrap();
        assert_eq!(r.mount_path, "/a/b/");
        assert_eq!(r.relative, "/x");
        let inner_dyn: Arc<dyn StorageBackend> = inner;
        assert!(Arc::ptr_eq(&r.backend, &inner_dyn));

        assert_eq!(table.resolve("/a/bx").unwrap().mount_path, "/a/");
        assert_eq!(table.resolve("/a/c").unwrap().relative, "/c");
    }

    #[test]
    fn test_no_prefix_aliasing() {
        let table = MountTable::new();
        table.mount("/data", FlatStoreBackend::in_memory());

        assert!(matches!(
            table.resolve("/database/file"),
            Err(VfsError::NoMountPoint(_))
        ));
    }

    #[test]
    fn test_root_mount_catches_everything() {
        let table = MountTable::new();
        table.mount("/", FlatStoreBackend::in_memory());
        table.mount("/scratch", FlatStoreBackend::in_memory());

        assert_eq!(table.resolve("/").unwrap().relative, "/");
        assert_eq!(table.resolve("/x/y").unwrap().mount_path, "/");
        assert_eq!(table.resolve("/x/y").unwrap().relative, "/x/y");
        assert_eq!(table.resolve("/scratch/t").unwrap().mount_path, "/scratch/");
    }

    #[test]
    fn test_empty_table_has_no_root() {
        let table = MountTable::new();
        assert!(matches!(table.resolve("/"), Err(VfsError::NoMountPoint(_))));
    }

    #[test]
    fn test_remount_replaces() {
        let table = MountTable::new();
        let dir = tempfile::tempdir().unwrap();
        table.mount("/m", FlatStoreBackend::in_memory());
        table.mount("/m/", LocalBackend::new(dir.path()));

        let mounts = table.list_mounts();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].kind, BackendKind::Native);
        assert!(!mounts[0].batch);
    }

    #[test]
    fn test_list_sorted_most_specific_first() {
        let table = MountTable::new();
        table.mount("/", FlatStoreBackend::in_memory());
        table.mount("/a/b/c", FlatStoreBackend::in_memory());
        table.mount("/a", FlatStoreBackend::in_memory());

        let paths: Vec<_> = table.list_mounts().into_iter().map(|m| m.mount_path).collect();
        assert_eq!(paths, ["/a/b/c/", "/a/", "/"]);
    }

    #[test]
    fn test_unmount_and_is_mounted() {
        let table = MountTable::new();
        table.mount("/scratch", FlatStoreBackend::in_memory());
        assert!(table.is_mounted("/scratch"));
        assert!(!table.is_mounted("/scratch/sub"));

        assert!(table.unmount("/scratch/"));
        assert!(!table.unmount("/scratch"));
        assert!(!table.is_mounted("/scratch"));
        assert!(table.resolve("/scratch/file").is_err());
    }

    #[test]
    fn test_to_virtual() {
        let table = MountTable::new();
        table.mount("/data", FlatStoreBackend::in_memory());
        table.mount("/", FlatStoreBackend::in_memory());

        let r = table.resolve("/data/dir").unwrap();
        assert_eq!(r.to_virtual("/dir/f.txt"), "/data/dir/f.txt");
        let root = table.resolve("/other").unwrap();
        assert_eq!(root.to_virtual("/other/f.txt"), "/other/f.txt");
    }
}
