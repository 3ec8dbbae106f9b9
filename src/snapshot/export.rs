//! Key enumeration and export.

use super::Snapshot;
use crate::error::Result;
use crate::namespace::StorageKey;
use crate::storage::StorageAdapter;
use crate::tree::{walk, TreeNode};
use futures::future::join_all;

/// Keys of every node under `node`, in pre-order.
///
/// `path` is the full segment path of `node`, root key included.
pub fn subtree_keys(node: &TreeNode, path: &[String]) -> Vec<StorageKey> {
    let mut keys = Vec::new();
    walk(node, path, &mut |_, p| keys.push(StorageKey::encode(p)));
    keys
}

/// Read the raw blob of every key, keeping the non-empty ones.
pub async fn export_keys(storage: &dyn StorageAdapter, keys: &[StorageKey]) -> Result<Snapshot> {
    let reads = join_all(keys.iter().map(|key| storage.get(key.as_str()))).await;

    let mut snapshot = Snapshot::new();
    for (key, value) in keys.iter().zip(reads) {
        if let Some(value) = value?.filter(|v| !v.is_empty()) {
            snapshot.insert(key.as_str(), value);
        }
    }
    Ok(snapshot)
}
