//! Backend family reported for a mount.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of storage engine serves a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Flat key-value record store with emulated directories.
    FlatStore,
    /// Storage with native directory handles (the host filesystem).
    Native,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::FlatStore => "flat_store",
            BackendKind::Native => "native",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
