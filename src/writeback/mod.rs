//! Write-back of node state after mutating actions.
//!
//! A [`PersistingAction`] wraps an asynchronous action. Once the action
//! resolves successfully, the node that issued it is located through the
//! [`CommitIndex`], its persistable fields are filtered by the field policy
//! registry, and the serialized slice is written to the node's key in a
//! background task. The action's caller gets its result without waiting for
//! that write; [`PendingWrites::flush`] awaits all of them.

mod action;
mod index;
mod pending;

pub use action::{ActionContext, ActionHandler, AsyncAction, PersistingAction, SyncAction, WriteBack};
pub use index::CommitIndex;
pub use pending::PendingWrites;
