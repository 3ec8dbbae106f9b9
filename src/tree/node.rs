//! Tree node implementation.

use super::definition::ModuleDefinition;
use crate::error::{Result, VaultError};
use crate::hydrate::merge_into;
use crate::types::{CommitHandle, IdAllocator, StateId, StateMap};
use serde_json::Value;
use tracing::debug;

/// One node of the live state tree.
#[derive(Clone, Debug)]
pub struct TreeNode {
    /// Identity of this node's state object.
    state_id: StateId,

    /// Handle mutations on this node are committed through.
    handle: CommitHandle,

    /// The node's own fields.
    local_state: StateMap,

    /// Declared defaults, restored on a full reset.
    defaults: StateMap,

    /// Named children in insertion order.
    children: Vec<(String, TreeNode)>,
}

impl TreeNode {
    /// Build a node (and its whole subtree) from a definition.
    pub fn build(definition: &ModuleDefinition, ids: &IdAllocator) -> Result<Self> {
        definition.validate()?;
        Ok(Self::build_unchecked(definition, ids))
    }

    fn build_unchecked(definition: &ModuleDefinition, ids: &IdAllocator) -> Self {
        let children = definition
            .children
            .iter()
            .map(|(name, child)| (name.clone(), Self::build_unchecked(child, ids)))
            .collect();

        Self {
            state_id: ids.state_id(),
            handle: ids.commit_handle(),
            local_state: definition.state.clone(),
            defaults: definition.state.clone(),
            children,
        }
    }

    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    pub fn handle(&self) -> CommitHandle {
        self.handle
    }

    pub fn local_state(&self) -> &StateMap {
        &self.local_state
    }

    pub fn local_state_mut(&mut self) -> &mut StateMap {
        &mut self.local_state
    }

    pub fn defaults(&self) -> &StateMap {
        &self.defaults
    }

    /// Children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|(n, _)| n == name)
    }

    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut TreeNode> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    /// Node at `path` relative to this one.
    pub fn descendant<S: AsRef<str>>(&self, path: &[S]) -> Option<&TreeNode> {
        path.iter()
            .try_fold(self, |node, segment| node.child(segment.as_ref()))
    }

    pub fn descendant_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut TreeNode> {
        let mut node = self;
        for segment in path {
            node = node.child_mut(segment.as_ref())?;
        }
        Some(node)
    }

    /// Attach `node` as child `name`.
    pub fn attach(&mut self, name: impl Into<String>, node: TreeNode) -> Result<()> {
        let name = name.into();
        if self.has_child(&name) {
            return Err(VaultError::PathExists(name));
        }
        self.children.push((name, node));
        Ok(())
    }

    /// Detach and return child `name`.
    pub fn detach(&mut self, name: &str) -> Option<TreeNode> {
        let pos = self.children.iter().position(|(n, _)| n == name)?;
        Some(self.children.remove(pos).1)
    }

    /// Nested state: own fields plus one entry per child.
    pub fn state_value(&self) -> Value {
        let mut map = self.local_state.clone();
        for (name, child) in &self.children {
            map.insert(name.clone(), child.state_value());
        }
        Value::Object(map)
    }

    /// Deep-merge a nested state object into this subtree.
    ///
    /// Entries naming a child descend into that child; all other entries
    /// merge into the node's own fields.
    pub fn merge_state(&mut self, incoming: &StateMap) {
        for (key, value) in incoming {
            if let Some(child) = self.child_mut(key) {
                match value {
                    Value::Object(nested) => child.merge_state(nested),
                    _ => debug!(child = %key, "ignoring non-object state for child node"),
                }
                continue;
            }
            match self.local_state.get_mut(key) {
                Some(existing) => merge_into(existing, value),
                None => {
                    self.local_state.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Restore declared defaults throughout this subtree.
    pub fn reset_to_defaults(&mut self) {
        self.local_state = self.defaults.clone();
        for (_, child) in &mut self.children {
            child.reset_to_defaults();
        }
    }
}
