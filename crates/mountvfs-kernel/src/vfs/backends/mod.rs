//! VFS backends.
//!
//! Backends implement [`StorageBackend`] for different storage types:
//!
//! - [`FlatStoreBackend`] emulates directories over a path-keyed record store
//! - [`LocalBackend`] delegates to a host directory

mod flat_store;
mod local;

pub use flat_store::FlatStoreBackend;
pub use local::LocalBackend;

use std::path::Path;
use std::sync::Arc;

use super::ops::StorageBackend;
use super::store::{MemoryRecordStore, SqliteRecordStore};
use super::VfsResult;
use crate::config::{BackendConfig, FlatStoreConfig};

/// Build the backend a config entry asks for.
///
/// `Local` creates its root when missing. `Auto` prefers an existing host
/// directory, then a SQLite database, then memory.
pub async fn open_backend(
    config: &BackendConfig,
    flat_store: &FlatStoreConfig,
) -> VfsResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config {
        BackendConfig::Memory => Arc::new(FlatStoreBackend::with_config(
            Arc::new(MemoryRecordStore::new()),
            flat_store.clone(),
        )),
        BackendConfig::Sqlite { path } => open_sqlite(path, flat_store)?,
        BackendConfig::Local { root } => {
            tokio::fs::create_dir_all(root).await?;
            Arc::new(LocalBackend::new(root))
        }
        BackendConfig::Auto { root, database } => {
            match root {
                Some(root) if is_dir(root).await => Arc::new(LocalBackend::new(root)),
                _ => match database {
                    Some(path) => open_sqlite(path, flat_store)?,
                    None => Arc::new(FlatStoreBackend::with_config(
                        Arc::new(MemoryRecordStore::new()),
                        flat_store.clone(),
                    )),
                },
            }
        }
    };
    Ok(backend)
}

fn open_sqlite(path: &Path, flat_store: &FlatStoreConfig) -> VfsResult<Arc<dyn StorageBackend>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteRecordStore::open(path)?;
    Ok(Arc::new(FlatStoreBackend::with_config(
        Arc::new(store),
        flat_store.clone(),
    )))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
