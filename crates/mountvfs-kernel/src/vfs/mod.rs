//! Virtual Filesystem.
//!
//! A path-based VFS over pluggable storage engines. Key components:
//!
//! - [`StorageBackend`] - Core trait every engine implements
//! - [`MountTable`] - Routes paths to backends by longest prefix
//! - [`VirtualFs`] - The service: resolution, delegation, change events
//! - [`FlatStoreBackend`] - Directories emulated over a flat record store
//! - [`LocalBackend`] - Host filesystem access (with path containment)
//!
//! ## Design Decisions
//!
//! - **Canonical string paths**: every path is normalized on entry, so
//!   string equality is path equality and range scans work on raw keys.
//! - **Explicit directory records**: a flat store never infers a directory
//!   from a file key; `mkdir` and writes create the ancestor records.
//! - **Capabilities at mount time**: whether a backend batches natively is
//!   decided once when it is mounted, not probed per call.

pub mod backends;
pub mod batch;
mod error;
pub mod events;
mod mount;
mod ops;
pub mod path;
mod service;
pub mod store;

pub use backends::{FlatStoreBackend, LocalBackend};
pub use batch::{BatchOptions, BatchProgress, BatchWriteOptions};
pub use error::{VfsError, VfsResult};
pub use events::{EventBus, Subscription};
pub use mount::{MountInfo, MountTable, ResolvedPath};
pub use ops::{BatchOps, StorageBackend};
pub use service::VirtualFs;
