//! Core types for the state vault.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Field mapping of a single node (field name to JSON value).
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Stable identity of one node's state object.
///
/// Field policies are keyed by this id rather than by the value of the
/// state, since state is mutated in place.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub u64);

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({})", self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-node handle used to commit mutations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitHandle(pub u64);

impl fmt::Debug for CommitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitHandle({})", self.0)
    }
}

/// Allow/deny classification of a state object's fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Only explicitly marked fields are persisted.
    Allow,
    /// Every field except the explicitly marked ones is persisted.
    Deny,
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::Deny
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Allow => f.write_str("allow"),
            PolicyKind::Deny => f.write_str("deny"),
        }
    }
}

/// Hands out the ids attached to nodes when they are created.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn state_id(&self) -> StateId {
        StateId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn commit_handle(&self) -> CommitHandle {
        CommitHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a segment path for messages (`a/b/c`).
pub fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let ids = IdAllocator::new();
        let a = ids.state_id();
        let b = ids.commit_handle();
        let c = ids.state_id();
        assert_ne!(a.0, b.0);
        assert_ne!(b.0, c.0);
        assert!(c > a);
    }

    #[test]
    fn test_default_policy_is_deny() {
        assert_eq!(PolicyKind::default(), PolicyKind::Deny);
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path(&[]), "<root>");
        assert_eq!(display_path(&["a".into(), "b".into()]), "a/b");
    }
}
