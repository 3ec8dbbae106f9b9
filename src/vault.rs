//! Main StateVault struct tying all components together.

use crate::error::{Result, VaultError};
use crate::hydrate::apply_to_tree;
use crate::lifecycle::{LifecycleCoordinator, START_BARRIER};
use crate::namespace::{validate_segment, StorageKey};
use crate::policy::FieldPolicyRegistry;
use crate::snapshot::{
    export_keys, import_keys, stale_keys, subtree_keys, LoadOptions, LoadSummary, Snapshot,
};
use crate::storage::{BackendConfig, StorageAdapter};
use crate::tree::{walk, ModuleDefinition, TreeNode};
use crate::types::{display_path, CommitHandle, IdAllocator, PolicyKind, StateMap};
use crate::writeback::{CommitIndex, PendingWrites};
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default root key the persisted tree lives under.
pub const DEFAULT_ROOT_KEY: &str = "storage";

/// Vault configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Key segment every storage key starts with.
    pub root_key: String,

    /// Storage backend to open.
    pub backend: BackendConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root_key: DEFAULT_ROOT_KEY.to_string(),
            backend: BackendConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Parse a JSON configuration document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| VaultError::Configuration(format!("invalid vault config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_segment(&self.root_key)
    }
}

/// The state vault.
///
/// Owns the live state tree and the registries keyed by node identity, and
/// mirrors the tree into storage:
/// - hydrating it from storage on attach and on subtree registration
/// - writing node slices back after persisting actions
/// - exporting and importing flat snapshots
/// - cleaning up keys when subtrees are removed
pub struct StateVault {
    /// Vault configuration.
    config: VaultConfig,

    /// Storage backend.
    storage: Arc<dyn StorageAdapter>,

    /// Live state tree.
    tree: RwLock<TreeNode>,

    /// Field persistence policies.
    policies: RwLock<FieldPolicyRegistry>,

    /// Commit handle to node path.
    commits: RwLock<CommitIndex>,

    /// Id source for new nodes.
    ids: IdAllocator,

    /// Startup barriers.
    lifecycle: LifecycleCoordinator,

    /// Background write-backs.
    pending: PendingWrites,
}

impl StateVault {
    /// Open the configured backend and attach: hydration starts immediately
    /// and is registered on the start barrier.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: VaultConfig, definition: &ModuleDefinition) -> Result<Arc<Self>> {
        let storage = config.backend.open()?;
        let vault = Self::with_storage(config, storage, definition)?;
        vault.attach();
        Ok(vault)
    }

    /// Build a vault over `storage` without hydrating.
    pub fn with_storage(
        config: VaultConfig,
        storage: Arc<dyn StorageAdapter>,
        definition: &ModuleDefinition,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let ids = IdAllocator::new();
        let root = TreeNode::build(definition, &ids)?;

        let mut policies = FieldPolicyRegistry::new();
        policies.register_definition(&root, definition)?;

        let mut commits = CommitIndex::new();
        commits.reindex(&root);

        Ok(Arc::new(Self {
            config,
            storage,
            tree: RwLock::new(root),
            policies: RwLock::new(policies),
            commits: RwLock::new(commits),
            ids,
            lifecycle: LifecycleCoordinator::new(),
            pending: PendingWrites::new(),
        }))
    }

    /// Start hydrating the whole tree and gate the start barrier on it.
    pub fn attach(self: &Arc<Self>) {
        self.attach_with(|task| self.lifecycle.register_task(task, START_BARRIER));
    }

    /// Hand the hydration task to `register` instead of the start barrier.
    ///
    /// The task is not running yet; `register` decides how it is spawned
    /// and what the application waits on. Hydration failures are swallowed
    /// inside the task, so it always resolves to `Ok(())`.
    pub fn attach_with<F>(self: &Arc<Self>, register: F)
    where
        F: FnOnce(BoxFuture<'static, Result<()>>),
    {
        let vault = Arc::clone(self);
        register(
            async move {
                vault.hydrate().await;
                Ok(())
            }
            .boxed(),
        );
    }

    /// Wait for everything gated on the start barrier.
    ///
    /// Any number of callers may wait at once; each returns once every task
    /// registered on the barrier so far has finished. Returns how many
    /// tasks that was.
    pub async fn start_app(&self) -> Result<usize> {
        Ok(self.lifecycle.run_barrier(START_BARRIER).await?.len())
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn root_key(&self) -> &str {
        &self.config.root_key
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn lifecycle(&self) -> &LifecycleCoordinator {
        &self.lifecycle
    }

    /// Full segment path (root key first) of a tree path.
    fn full_path(&self, path: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(path.len() + 1);
        full.push(self.config.root_key.clone());
        full.extend_from_slice(path);
        full
    }

    /// Storage key of the node at `path`.
    pub fn key_for(&self, path: &[String]) -> StorageKey {
        StorageKey::encode(&self.full_path(path))
    }

    // --- Tree access ---

    /// Nested state of the whole tree.
    pub fn state(&self) -> Value {
        self.tree.read().state_value()
    }

    /// Nested state of the subtree at `path`.
    pub fn state_at(&self, path: &[String]) -> Result<Value> {
        let tree = self.tree.read();
        let node = tree
            .descendant(path)
            .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
        Ok(node.state_value())
    }

    /// Nested state of the node owning `handle`.
    pub fn state_of(&self, handle: CommitHandle) -> Result<Value> {
        let path = self.resolve(handle)?;
        self.state_at(&path)
    }

    /// Commit handle of the node at `path`.
    pub fn handle_at(&self, path: &[String]) -> Result<CommitHandle> {
        self.tree
            .read()
            .descendant(path)
            .map(TreeNode::handle)
            .ok_or_else(|| VaultError::PathNotFound(display_path(path)))
    }

    fn resolve(&self, handle: CommitHandle) -> Result<Vec<String>> {
        self.commits
            .read()
            .resolve(handle)
            .map(<[String]>::to_vec)
            .ok_or(VaultError::UnknownHandle(handle))
    }

    /// Apply a mutation to the own fields of the node owning `handle`.
    ///
    /// This only changes the live tree; persistence happens through
    /// [`PersistingAction`](crate::writeback::PersistingAction).
    pub fn commit<F>(&self, handle: CommitHandle, mutation: F) -> Result<()>
    where
        F: FnOnce(&mut StateMap),
    {
        let path = self.resolve(handle)?;
        let mut tree = self.tree.write();
        let node = tree
            .descendant_mut(&path)
            .ok_or(VaultError::UnknownHandle(handle))?;
        mutation(node.local_state_mut());
        Ok(())
    }

    /// Declare a field policy on the node at `path` after construction.
    pub fn declare_field(&self, path: &[String], field: &str, kind: PolicyKind) -> Result<()> {
        let state = self
            .tree
            .read()
            .descendant(path)
            .map(TreeNode::state_id)
            .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
        self.policies.write().declare(state, field, kind)
    }

    /// Fields of the node at `path` that would be persisted right now.
    pub fn persisted_fields(&self, path: &[String]) -> Result<StateMap> {
        let tree = self.tree.read();
        let node = tree
            .descendant(path)
            .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
        Ok(self.policies.read().filter_for_persistence(node))
    }

    fn reindex(&self) {
        let tree = self.tree.read();
        self.commits.write().reindex(&tree);
    }

    // --- Hydration ---

    /// Hydrate the whole tree, falling back to in-memory state on failure.
    pub async fn hydrate(&self) {
        if let Err(e) = self.try_hydrate(&[]).await {
            warn!(error = %e, "hydration failed, keeping in-memory state");
        }
    }

    /// Hydrate the subtree at `path`, reporting failures.
    pub async fn try_hydrate(&self, path: &[String]) -> Result<()> {
        apply_to_tree(self.storage.as_ref(), &self.tree, &self.config.root_key, path).await
    }

    // --- Write-back ---

    /// Serialized persistable slice of the node at `path`, with its key.
    fn persistable_blob(&self, path: &[String]) -> Result<(StorageKey, String)> {
        let fields = self.persisted_fields(path)?;
        Ok((self.key_for(path), serde_json::to_string(&fields)?))
    }

    /// Start a background write of the node owning `handle`.
    ///
    /// Handles that no longer belong to a live node are skipped.
    pub(crate) fn schedule_write_back(&self, handle: CommitHandle) -> Result<()> {
        let Some(path) = self.commits.read().resolve(handle).map(<[String]>::to_vec) else {
            debug!(?handle, "write-back for detached node skipped");
            return Ok(());
        };
        let (key, blob) = match self.persistable_blob(&path) {
            Ok(entry) => entry,
            Err(VaultError::PathNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let storage = Arc::clone(&self.storage);
        trace!(key = %key, "scheduling write-back");
        self.pending.track(tokio::spawn(async move {
            storage.set(key.as_str(), blob).await
        }));
        Ok(())
    }

    /// Write the node at `path` now and wait for it.
    pub async fn persist_node(&self, path: &[String]) -> Result<()> {
        let (key, blob) = self.persistable_blob(path)?;
        self.storage.set(key.as_str(), blob).await
    }

    /// Wait for every background write-back started so far.
    pub async fn flush(&self) -> Result<usize> {
        self.pending.flush().await
    }

    // --- Snapshots ---

    fn keys_under(&self, path: &[String]) -> Result<Vec<StorageKey>> {
        let tree = self.tree.read();
        let node = tree
            .descendant(path)
            .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
        Ok(subtree_keys(node, &self.full_path(path)))
    }

    /// Raw blobs of every node under `path`.
    pub async fn export_keys(&self, path: &[String]) -> Result<Snapshot> {
        let keys = self.keys_under(path)?;
        export_keys(self.storage.as_ref(), &keys).await
    }

    /// Rebuild the nested object `snapshot` holds for `path`.
    pub fn import_keys(&self, path: &[String], snapshot: &Snapshot) -> StateMap {
        import_keys(&self.key_for(path), snapshot)
    }

    /// Make storage under `path` match `snapshot`, then apply it to the tree.
    ///
    /// Stale keys are removed first, then every snapshot entry is written,
    /// then the reconstructed object is merged into the subtree (after
    /// resetting it to defaults when `options.replace` is set).
    pub async fn load_store(&self, path: &[String], snapshot: &Snapshot, options: LoadOptions) -> Result<LoadSummary> {
        let existing = self.export_keys(path).await?;
        let removed = stale_keys(&existing, snapshot, &options);

        let removals = join_all(removed.iter().map(|key| self.storage.remove(key))).await;
        removals.into_iter().collect::<Result<Vec<_>>>()?;

        let writes = join_all(
            snapshot
                .iter()
                .map(|(key, blob)| self.storage.set(key, blob.to_string())),
        )
        .await;
        writes.into_iter().collect::<Result<Vec<_>>>()?;

        let imported = self.import_keys(path, snapshot);
        {
            let mut tree = self.tree.write();
            let node = tree
                .descendant_mut(path)
                .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
            if options.replace {
                node.reset_to_defaults();
            }
            node.merge_state(&imported);
        }

        debug!(
            path = %display_path(path),
            removed = removed.len(),
            written = snapshot.len(),
            "loaded snapshot"
        );
        Ok(LoadSummary {
            removed,
            written: snapshot.len(),
        })
    }

    // --- Dynamic registration ---

    /// Attach a new subtree at `path`.
    ///
    /// Without `initial`, the new subtree starts from its declared defaults
    /// and is hydrated from whatever storage already holds for it. With
    /// `initial`, that state is merged over the defaults and every node of
    /// the subtree is written to storage before returning.
    pub async fn register_subtree(
        &self,
        path: &[String],
        definition: &ModuleDefinition,
        initial: Option<Value>,
    ) -> Result<()> {
        let (name, parent) = path
            .split_last()
            .ok_or_else(|| VaultError::Configuration("cannot register the root".into()))?;
        for segment in path {
            validate_segment(segment)?;
        }
        let initial = match initial {
            None => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(VaultError::Configuration(
                    "initial state must be an object".into(),
                ))
            }
        };

        let mut node = TreeNode::build(definition, &self.ids)?;
        if let Some(initial) = &initial {
            node.merge_state(initial);
        }

        {
            let mut tree = self.tree.write();
            let parent_node = tree
                .descendant_mut(parent)
                .ok_or_else(|| VaultError::PathNotFound(display_path(parent)))?;
            if parent_node.has_child(name) {
                return Err(VaultError::PathExists(display_path(path)));
            }
            self.policies.write().register_definition(&node, definition)?;
            parent_node.attach(name.clone(), node)?;
        }
        self.reindex();
        debug!(path = %display_path(path), "registered subtree");

        if initial.is_some() {
            self.persist_subtree(path).await
        } else {
            if let Err(e) = self.try_hydrate(path).await {
                warn!(path = %display_path(path), error = %e, "hydration of new subtree failed");
            }
            Ok(())
        }
    }

    /// Write every node under `path` and wait for all of them.
    async fn persist_subtree(&self, path: &[String]) -> Result<()> {
        let entries = {
            let tree = self.tree.read();
            let node = tree
                .descendant(path)
                .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
            let policies = self.policies.read();
            let mut entries = Vec::new();
            let mut failure = None;
            walk(node, &self.full_path(path), &mut |n, p| {
                let fields = policies.filter_for_persistence(n);
                match serde_json::to_string(&fields) {
                    Ok(blob) => entries.push((StorageKey::encode(p), blob)),
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            });
            if let Some(e) = failure {
                return Err(e.into());
            }
            entries
        };

        let writes = join_all(
            entries
                .iter()
                .map(|(key, blob)| self.storage.set(key.as_str(), blob.clone())),
        )
        .await;
        writes.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    /// Remove the subtree at `path` and every storage key under it.
    ///
    /// Keys are deleted while the subtree is still attached; if any removal
    /// fails the subtree stays attached.
    pub async fn unregister_subtree(&self, path: &[String]) -> Result<()> {
        let (name, parent) = path
            .split_last()
            .ok_or_else(|| VaultError::Configuration("cannot unregister the root".into()))?;

        let keys = self.keys_under(path)?;
        let removals = join_all(keys.iter().map(|key| self.storage.remove(key.as_str()))).await;
        removals.into_iter().collect::<Result<Vec<_>>>()?;

        let detached = self
            .tree
            .write()
            .descendant_mut(parent)
            .and_then(|p| p.detach(name))
            .ok_or_else(|| VaultError::PathNotFound(display_path(path)))?;
        self.policies.write().forget_tree(&detached);
        self.reindex();

        debug!(path = %display_path(path), keys = keys.len(), "unregistered subtree");
        Ok(())
    }
}
