//! # mountvfs-kernel
//!
//! Mount-based virtual filesystem.
//!
//! A [`VirtualFs`] owns `/` and routes every path to the backend mounted
//! at its longest matching prefix:
//! - Flat-store backends keep files and directories as records in an
//!   in-memory map or a SQLite database
//! - Local backends delegate to a host directory
//! - Subscribers hear about every successful change
//!
//! ```ignore
//! let vfs = VirtualFs::new();
//! vfs.mount("/", FlatStoreBackend::in_memory());
//! vfs.mount_auto("/work", AutoMount::new().with_root("/srv/work")).await?;
//! vfs.write_file("/work/notes.txt", "hi").await?;
//! ```

pub mod config;
pub mod vfs;

pub use config::{AutoMount, BackendConfig, ConfigError, FlatStoreConfig, MountConfig, VfsConfig};
pub use vfs::{
    BatchOps, BatchOptions, BatchProgress, BatchWriteOptions, FlatStoreBackend, LocalBackend,
    MountInfo, MountTable, ResolvedPath, StorageBackend, Subscription, VfsError, VfsResult,
    VirtualFs,
    store::{
        DirectoryRecord, FileRecord, KeyRange, MemoryRecordStore, RecordStore, SqliteRecordStore,
    },
};

pub use mountvfs_types::{BackendKind, Content, FileEntry, FileKind, FileStats, VfsEvent};
