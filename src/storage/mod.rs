//! Asynchronous key-value storage backends.
//!
//! The engine only ever talks to storage through [`StorageAdapter`]. Two
//! concrete backends exist and the one to use is picked from configuration
//! when the vault is built:
//!
//! - [`MemoryStorage`]: an in-process map, suitable for tests and for
//!   hosts that provide their own durability.
//! - [`FileStorage`]: one checksummed file per key inside a locked
//!   directory.

mod adapter;
mod file;
mod memory;

pub use adapter::StorageAdapter;
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Which backend to open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Volatile in-process storage.
    Memory,
    /// File-per-key storage under `path`.
    File { path: PathBuf },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

impl BackendConfig {
    /// Open the configured backend.
    pub fn open(&self) -> Result<Arc<dyn StorageAdapter>> {
        match self {
            BackendConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
            BackendConfig::File { path } => Ok(Arc::new(FileStorage::open(path)?)),
        }
    }
}
