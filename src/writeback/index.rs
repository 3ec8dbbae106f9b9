//! Commit handle index.

use crate::tree::{walk, TreeNode};
use crate::types::CommitHandle;
use std::collections::HashMap;

/// Maps each live node's commit handle to the node's path.
///
/// Paths are relative to the tree root (the root key is not included).
#[derive(Debug, Default)]
pub struct CommitIndex {
    entries: HashMap<CommitHandle, Vec<String>>,
}

impl CommitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from the current tree.
    pub fn reindex(&mut self, root: &TreeNode) {
        self.entries.clear();
        walk(root, &[], &mut |node, path| {
            self.entries.insert(node.handle(), path.to_vec());
        });
    }

    /// Path of the node owning `handle`.
    pub fn resolve(&self, handle: CommitHandle) -> Option<&[String]> {
        self.entries.get(&handle).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ModuleDefinition;
    use crate::types::IdAllocator;

    #[test]
    fn test_reindex_tracks_tree() {
        let ids = IdAllocator::new();
        let def = ModuleDefinition::empty()
            .child("a", ModuleDefinition::empty().child("b", ModuleDefinition::empty()));
        let mut root = TreeNode::build(&def, &ids).unwrap();

        let mut index = CommitIndex::new();
        index.reindex(&root);
        assert_eq!(index.len(), 3);

        let b = root.descendant(&["a", "b"]).unwrap().handle();
        assert_eq!(index.resolve(b), Some(&["a".to_string(), "b".to_string()][..]));
        assert_eq!(index.resolve(root.handle()), Some(&[][..]));

        root.detach("a");
        index.reindex(&root);
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve(b), None);
    }
}
