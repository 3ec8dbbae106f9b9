//! The storage contract.

use crate::error::Result;
use async_trait::async_trait;

/// Uniform asynchronous key-value interface over a storage backend.
///
/// Implementations resolve `get` of a missing key to `Ok(None)` and report
/// non-fatal backend conditions (unreadable or corrupt entries) as an
/// absent value. Only genuine backend failures become errors.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the raw string stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}
