//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// No mount point resolves the path.
    #[error("no mount point for path: {0}")]
    NoMountPoint(String),

    /// Operation not permitted on this kind of entry (e.g. renaming a
    /// directory, writing to the root).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Host filesystem error from a native backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record store error from a flat-store backend.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NoMountPoint error.
    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    /// Create an InvalidOperation error.
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns true for NotFound, including an `io::ErrorKind::NotFound`
    /// surfaced by a native backend.
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::NoMountPoint(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::InvalidOperation(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Io(e) => e,
            VfsError::Store(e) => io::Error::other(e),
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
