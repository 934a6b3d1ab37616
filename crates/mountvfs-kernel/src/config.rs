//! Service configuration.
//!
//! Configuration is written in RON:
//!
//! ```ron
//! (
//!     fanout_concurrency: 8,
//!     flat_store: (chunk_size: 100),
//!     mounts: [
//!         (path: "/", backend: Memory),
//!         (path: "/data", backend: Sqlite(path: "/var/lib/app/data.db")),
//!         (path: "/src", backend: Local(root: "/home/me/src")),
//!         (path: "/cache", backend: Auto(root: Some("/tmp/cache"), database: None)),
//!     ],
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default number of concurrent calls when fanning a batch out to a backend
/// without native batch support.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 10;

/// Default number of entries per flat-store batch commit.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for a [`VirtualFs`](crate::VirtualFs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Width of fan-out chunks for backends without native batch support.
    pub fanout_concurrency: usize,
    /// Tuning for flat-store backends built from this config.
    pub flat_store: FlatStoreConfig,
    /// Mounts applied by [`VirtualFs::from_config`](crate::VirtualFs::from_config).
    pub mounts: Vec<MountConfig>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
            flat_store: FlatStoreConfig::default(),
            mounts: Vec::new(),
        }
    }
}

impl VfsConfig {
    /// Parse and validate a RON document.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: VfsConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a RON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&text)
    }

    /// Check the values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fanout_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fanout_concurrency must be at least 1".into(),
            ));
        }
        if self.flat_store.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "flat_store.chunk_size must be at least 1".into(),
            ));
        }
        for mount in &self.mounts {
            if mount.path.trim().is_empty() {
                return Err(ConfigError::Invalid("mount path is empty".into()));
            }
        }
        Ok(())
    }

    pub fn with_mount(mut self, path: impl Into<String>, backend: BackendConfig) -> Self {
        self.mounts.push(MountConfig {
            path: path.into(),
            backend,
        });
        self
    }
}

/// Flat-store tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatStoreConfig {
    /// Entries committed per multi-put during batch writes.
    pub chunk_size: usize,
}

impl Default for FlatStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// One mount: a virtual path and the backend to put there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub path: String,
    pub backend: BackendConfig,
}

/// Which backend to build for a mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendConfig {
    /// Ephemeral flat store.
    Memory,
    /// Flat store persisted in a SQLite database file.
    Sqlite { path: PathBuf },
    /// Host directory.
    Local { root: PathBuf },
    /// Pick the best available engine, see [`AutoMount`].
    Auto {
        #[serde(default)]
        root: Option<PathBuf>,
        #[serde(default)]
        database: Option<PathBuf>,
    },
}

impl From<AutoMount> for BackendConfig {
    fn from(auto: AutoMount) -> Self {
        BackendConfig::Auto {
            root: auto.root,
            database: auto.database,
        }
    }
}

/// Candidate engines for [`VirtualFs::mount_auto`](crate::VirtualFs::mount_auto).
///
/// The host root wins when it is an existing directory, then the database
/// file, then an in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoMount {
    pub root: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

impl AutoMount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = Some(database.into());
        self
    }
}
