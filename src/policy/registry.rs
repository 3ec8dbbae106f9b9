//! Policy registry implementation.

use crate::error::{Result, VaultError};
use crate::tree::{walk, ModuleDefinition, TreeNode};
use crate::types::{PolicyKind, StateId, StateMap};
use std::collections::{HashMap, HashSet};

/// Maps state identities to their policy bit and marked fields.
#[derive(Debug, Default)]
pub struct FieldPolicyRegistry {
    /// Policy tag per state object. Untagged objects use deny semantics.
    tags: HashMap<StateId, PolicyKind>,

    /// Fields explicitly marked on each state object.
    marked: HashMap<StateId, HashSet<String>>,
}

impl FieldPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a state object with `kind`.
    ///
    /// Re-tagging with the same kind is a no-op; tagging with the opposite
    /// kind is a configuration error.
    pub fn tag(&mut self, state: StateId, kind: PolicyKind) -> Result<()> {
        match self.tags.get(&state) {
            Some(existing) if *existing != kind => Err(VaultError::Configuration(format!(
                "state {} is already tagged {}, cannot tag {}",
                state, existing, kind
            ))),
            _ => {
                self.tags.insert(state, kind);
                Ok(())
            }
        }
    }

    /// Record that `field` was explicitly declared on `state`.
    pub fn mark_read(&mut self, state: StateId, field: impl Into<String>) {
        self.marked.entry(state).or_default().insert(field.into());
    }

    /// Tag `state` with `kind` and mark `field` in one step.
    pub fn declare(&mut self, state: StateId, field: impl Into<String>, kind: PolicyKind) -> Result<()> {
        self.tag(state, kind)?;
        self.mark_read(state, field);
        Ok(())
    }

    /// Effective policy of a state object.
    pub fn policy(&self, state: StateId) -> PolicyKind {
        self.tags.get(&state).copied().unwrap_or_default()
    }

    pub fn is_marked(&self, state: StateId, field: &str) -> bool {
        self.marked
            .get(&state)
            .is_some_and(|fields| fields.contains(field))
    }

    /// Apply the declarations of `definition` to the freshly built `node`.
    ///
    /// On a conflicting declaration every entry registered for the subtree
    /// is dropped again before the error is returned.
    pub fn register_definition(&mut self, node: &TreeNode, definition: &ModuleDefinition) -> Result<()> {
        let result = self.register_inner(node, definition);
        if result.is_err() {
            self.forget_tree(node);
        }
        result
    }

    fn register_inner(&mut self, node: &TreeNode, definition: &ModuleDefinition) -> Result<()> {
        for (field, kind) in &definition.fields {
            self.declare(node.state_id(), field.clone(), *kind)?;
        }
        for (name, child_def) in &definition.children {
            if let Some(child) = node.child(name) {
                self.register_inner(child, child_def)?;
            }
        }
        Ok(())
    }

    /// Drop everything recorded for one state object.
    pub fn forget(&mut self, state: StateId) {
        self.tags.remove(&state);
        self.marked.remove(&state);
    }

    /// Drop everything recorded for every node of a subtree.
    pub fn forget_tree(&mut self, node: &TreeNode) {
        walk(node, &[], &mut |n, _| self.forget(n.state_id()));
    }

    /// Number of state objects carrying a tag.
    pub fn tagged_count(&self) -> usize {
        self.tags.len()
    }

    /// The subset of a node's own fields eligible for persistence.
    ///
    /// Fields shadowed by a child node are never included.
    pub fn filter_for_persistence(&self, node: &TreeNode) -> StateMap {
        let state = node.state_id();
        let policy = self.policy(state);

        node.local_state()
            .iter()
            .filter(|(field, _)| !node.has_child(field))
            .filter(|(field, _)| {
                let marked = self.is_marked(state, field);
                match policy {
                    PolicyKind::Allow => marked,
                    PolicyKind::Deny => !marked,
                }
            })
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}
