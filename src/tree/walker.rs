//! Tree traversals.
//!
//! [`walk`] is a synchronous pre-order visit used for key enumeration and
//! re-indexing. [`fan_out`] runs asynchronous work for every node of a
//! [`TreeShape`], issuing each node's own work concurrently with its
//! children and joining them bottom-up.

use super::node::TreeNode;
use crate::error::Result;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::future::Future;

/// Visit `node` and every descendant in pre-order.
///
/// `base` is the path of `node` itself; the visitor receives each node with
/// its full path.
pub fn walk<F>(node: &TreeNode, base: &[String], visit: &mut F)
where
    F: FnMut(&TreeNode, &[String]),
{
    let mut path = base.to_vec();
    walk_inner(node, &mut path, visit);
}

fn walk_inner<F>(node: &TreeNode, path: &mut Vec<String>, visit: &mut F)
where
    F: FnMut(&TreeNode, &[String]),
{
    visit(node, path);
    for (name, child) in node.children() {
        path.push(name.to_string());
        walk_inner(child, path, visit);
        path.pop();
    }
}

/// Owned copy of a subtree's structure.
///
/// Async traversals run against a shape so the live tree never has to be
/// borrowed across a suspension point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeShape {
    pub children: Vec<(String, TreeShape)>,
}

impl TreeShape {
    pub fn of(node: &TreeNode) -> Self {
        Self {
            children: node
                .children()
                .map(|(name, child)| (name.to_string(), TreeShape::of(child)))
                .collect(),
        }
    }

    /// Number of nodes in the shape, including this one.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(|(_, c)| c.len()).sum::<usize>()
    }
}

/// Run `work` for every node under `shape` and fold the results bottom-up.
///
/// A node's own work and the recursion into its children are awaited
/// together; `combine` receives the node's result and its children's
/// results in child order once all of them have completed. The first error
/// wins, but every started future is driven to completion first.
pub fn fan_out<'a, T, W, Fut, C>(
    shape: &'a TreeShape,
    path: Vec<String>,
    work: &'a W,
    combine: &'a C,
) -> BoxFuture<'a, Result<T>>
where
    T: Send + 'a,
    W: Fn(Vec<String>) -> Fut + Sync,
    Fut: Future<Output = Result<T>> + Send + 'a,
    C: Fn(T, Vec<(String, T)>) -> T + Sync,
{
    async move {
        let own = work(path.clone());
        let children = join_all(shape.children.iter().map(|(name, child)| {
            let mut child_path = path.clone();
            child_path.push(name.clone());
            fan_out(child, child_path, work, combine).map(move |r| r.map(|v| (name.clone(), v)))
        }));

        let (own, children) = futures::join!(own, children);
        let children = children.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(combine(own?, children))
    }
    .boxed()
}
