//! Persisting action wrapper.

use crate::error::{Result, VaultError};
use crate::types::{CommitHandle, StateMap};
use crate::vault::StateVault;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Action that completes before returning.
pub type SyncAction = Arc<dyn Fn(&ActionContext) -> Result<Value> + Send + Sync>;

/// Action that returns a pending result.
pub type AsyncAction = Arc<dyn Fn(ActionContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A host action, as registered by the application.
#[derive(Clone)]
pub enum ActionHandler {
    Sync(SyncAction),
    Async(AsyncAction),
}

impl ActionHandler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&ActionContext) -> Result<Value> + Send + Sync + 'static,
    {
        ActionHandler::Sync(Arc::new(f))
    }

    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        ActionHandler::Async(Arc::new(move |ctx| f(ctx).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, ActionHandler::Async(_))
    }
}

impl std::fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionHandler::Sync(_) => f.write_str("ActionHandler::Sync"),
            ActionHandler::Async(_) => f.write_str("ActionHandler::Async"),
        }
    }
}

/// What an action sees while it runs.
#[derive(Clone)]
pub struct ActionContext {
    vault: Arc<StateVault>,
    handle: CommitHandle,
    payload: Value,
}

impl ActionContext {
    pub fn new(vault: Arc<StateVault>, handle: CommitHandle, payload: Value) -> Self {
        Self {
            vault,
            handle,
            payload,
        }
    }

    pub fn handle(&self) -> CommitHandle {
        self.handle
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn vault(&self) -> &Arc<StateVault> {
        &self.vault
    }

    /// Commit a mutation against the issuing node.
    pub fn commit<F>(&self, mutation: F) -> Result<()>
    where
        F: FnOnce(&mut StateMap),
    {
        self.vault.commit(self.handle, mutation)
    }

    /// Nested state of the issuing node.
    pub fn state(&self) -> Result<Value> {
        self.vault.state_of(self.handle)
    }
}

/// Decorator turning an asynchronous action into a persisting one.
pub struct WriteBack;

impl WriteBack {
    /// Wrap `handler` so its node is written back after it succeeds.
    ///
    /// Synchronous handlers are rejected: there is no pending result to
    /// chain the write onto.
    pub fn wrap(handler: ActionHandler) -> Result<PersistingAction> {
        match handler {
            ActionHandler::Async(action) => Ok(PersistingAction { action }),
            ActionHandler::Sync(_) => Err(VaultError::Misuse(
                "write-back must decorate an asynchronous action".into(),
            )),
        }
    }
}

/// An asynchronous action followed by a write-back of its node.
#[derive(Clone)]
pub struct PersistingAction {
    action: AsyncAction,
}

impl PersistingAction {
    /// Run the action for the node owning `handle`.
    ///
    /// Returns as soon as the action settles. On success a write of the
    /// node's filtered state is started in the background and tracked by
    /// the vault; a failed action writes nothing.
    pub async fn invoke(&self, vault: &Arc<StateVault>, handle: CommitHandle, payload: Value) -> Result<Value> {
        let ctx = ActionContext::new(Arc::clone(vault), handle, payload);
        let result = (self.action)(ctx).await?;
        vault.schedule_write_back(handle)?;
        Ok(result)
    }
}

impl std::fmt::Debug for PersistingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PersistingAction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_rejects_sync_handler() {
        let handler = ActionHandler::sync(|_| Ok(json!(null)));
        assert!(!handler.is_async());
        assert!(matches!(WriteBack::wrap(handler), Err(VaultError::Misuse(_))));
    }

    #[test]
    fn test_wrap_accepts_async_handler() {
        let handler = ActionHandler::asynchronous(|_ctx| async { Ok(json!(1)) });
        assert!(handler.is_async());
        assert!(WriteBack::wrap(handler).is_ok());
    }
}
