//! Loading persisted blobs.

use crate::error::{Result, VaultError};
use crate::namespace::StorageKey;
use crate::storage::StorageAdapter;
use crate::tree::{fan_out, TreeNode, TreeShape};
use crate::types::{display_path, StateMap};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};

/// Parse a stored blob into a field map.
///
/// Missing, unparsable, and non-object blobs all count as "nothing saved".
pub fn parse_blob(key: &str, raw: Option<&str>) -> StateMap {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return StateMap::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            debug!(key, "stored blob is not an object, ignoring");
            StateMap::new()
        }
        Err(e) => {
            debug!(key, error = %e, "stored blob is not valid JSON, ignoring");
            StateMap::new()
        }
    }
}

/// Load the persisted contents of a subtree.
///
/// `path` is the full segment path of the subtree root, root key included.
/// The result holds the root's own stored fields plus one entry per child
/// with that child's loaded subtree.
pub async fn load(storage: &dyn StorageAdapter, shape: &TreeShape, path: Vec<String>) -> Result<StateMap> {
    let work = |path: Vec<String>| async move {
        let key = StorageKey::encode(&path);
        let raw = storage.get(key.as_str()).await?;
        trace!(key = %key, found = raw.is_some(), "loaded blob");
        Ok::<_, VaultError>(parse_blob(key.as_str(), raw.as_deref()))
    };
    let combine = |mut own: StateMap, children: Vec<(String, StateMap)>| {
        for (name, child) in children {
            own.insert(name, Value::Object(child));
        }
        own
    };

    fan_out(shape, path, &work, &combine).await
}

/// Load the subtree at `path` (relative to the tree root) and merge it into
/// the live tree.
///
/// The tree lock is only held to copy the subtree's shape and to apply the
/// merge, never across a storage call.
pub async fn apply_to_tree(
    storage: &dyn StorageAdapter,
    tree: &RwLock<TreeNode>,
    root_key: &str,
    path: &[String],
) -> Result<()> {
    let shape = {
        let root = tree.read();
        let node = root
            .descendant(path)
            .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
        TreeShape::of(node)
    };

    let mut full_path = vec![root_key.to_string()];
    full_path.extend_from_slice(path);
    let loaded = load(storage, &shape, full_path).await?;

    let mut root = tree.write();
    let node = root
        .descendant_mut(path)
        .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
    node.merge_state(&loaded);
    debug!(path = %display_path(path), nodes = shape.len(), "hydrated subtree");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::tree::ModuleDefinition;
    use crate::types::IdAllocator;
    use serde_json::json;

    fn cart_tree() -> TreeNode {
        let def = ModuleDefinition::new(json!({"user": "anon"}))
            .unwrap()
            .child("cart", ModuleDefinition::new(json!({"items": []})).unwrap());
        TreeNode::build(&def, &IdAllocator::new()).unwrap()
    }

    #[test]
    fn test_parse_blob() {
        assert_eq!(Value::Object(parse_blob("k", Some(r#"{"a":1}"#))), json!({"a": 1}));
        assert!(parse_blob("k", None).is_empty());
        assert!(parse_blob("k", Some("")).is_empty());
        assert!(parse_blob("k", Some("{oops")).is_empty());
        assert!(parse_blob("k", Some("[1,2]")).is_empty());
    }

    #[tokio::test]
    async fn test_load_nests_children() {
        let storage = MemoryStorage::with_entries([
            ("storage/", r#"{"user":"ada"}"#),
            ("storage/cart/", r#"{"items":[1,2,3]}"#),
        ]);
        let shape = TreeShape::of(&cart_tree());

        let loaded = load(&storage, &shape, vec!["storage".into()]).await.unwrap();
        assert_eq!(
            Value::Object(loaded),
            json!({"user": "ada", "cart": {"items": [1, 2, 3]}})
        );
    }

    #[tokio::test]
    async fn test_load_missing_blobs_are_empty() {
        let storage = MemoryStorage::new();
        let shape = TreeShape::of(&cart_tree());
        let loaded = load(&storage, &shape, vec!["storage".into()]).await.unwrap();
        assert_eq!(Value::Object(loaded), json!({"cart": {}}));
    }

    #[tokio::test]
    async fn test_apply_to_tree_merges() {
        let storage = MemoryStorage::with_entries([("storage/cart/", r#"{"items":[7]}"#)]);
        let tree = RwLock::new(cart_tree());

        apply_to_tree(&storage, &tree, "storage", &[]).await.unwrap();
        assert_eq!(
            tree.read().state_value(),
            json!({"user": "anon", "cart": {"items": [7]}})
        );
    }

    #[tokio::test]
    async fn test_apply_to_missing_path() {
        let storage = MemoryStorage::new();
        let tree = RwLock::new(cart_tree());
        let result = apply_to_tree(&storage, &tree, "storage", &["nope".to_string()]).await;
        assert!(matches!(result, Err(VaultError::PathNotFound(_))));
    }
}
