//! Batch operation options and progress reporting.

use std::fmt;
use std::sync::Arc;

/// Progress of a batch write: `completed` out of `total` entries.
///
/// Reported after each committed chunk. `completed` never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    /// Returns true once every entry has been written.
    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// Progress callback shared across chunks and backends.
pub type ProgressFn = Arc<dyn Fn(BatchProgress) + Send + Sync>;

/// Options for the service-level batch operations.
#[derive(Clone)]
pub struct BatchOptions {
    /// Create ancestor directories before writing. Defaults to true.
    pub create_parents: bool,
    /// Suppress change events for the written paths.
    pub silent: bool,
    /// Called after each chunk with aggregate progress.
    pub on_progress: Option<ProgressFn>,
    /// Chunk width. Falls back to the configured default when unset.
    pub concurrency: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            create_parents: true,
            silent: false,
            on_progress: None,
            concurrency: None,
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_parents(mut self, create_parents: bool) -> Self {
        self.create_parents = create_parents;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_progress(mut self, f: impl Fn(BatchProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("create_parents", &self.create_parents)
            .field("silent", &self.silent)
            .field("on_progress", &self.on_progress.is_some())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// Options handed to a backend's native batch write.
#[derive(Clone, Default)]
pub struct BatchWriteOptions {
    /// Entries committed per unit. `None` uses the backend's own default.
    pub chunk_size: Option<usize>,
    /// Skip the up-front ancestor directory pass.
    pub skip_parents: bool,
    /// Progress over this backend's entries only.
    pub on_progress: Option<ProgressFn>,
}

impl BatchWriteOptions {
    pub(crate) fn report(&self, completed: usize, total: usize) {
        if let Some(f) = &self.on_progress {
            f(BatchProgress::new(completed, total));
        }
    }
}

impl fmt::Debug for BatchWriteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriteOptions")
            .field("chunk_size", &self.chunk_size)
            .field("skip_parents", &self.skip_parents)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}
