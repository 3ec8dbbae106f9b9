//! The live state tree.
//!
//! A tree is built from a [`ModuleDefinition`]: every node owns its local
//! fields plus an ordered set of named children. Nodes receive a
//! [`StateId`](crate::types::StateId) and a
//! [`CommitHandle`](crate::types::CommitHandle) when they are created; both
//! stay stable for the node's lifetime.
//!
//! [`walker`] holds the traversals every other component builds on.

mod definition;
mod node;
pub mod walker;

pub use definition::ModuleDefinition;
pub use node::TreeNode;
pub use walker::{fan_out, walk, TreeShape};
