//! # State Vault
//!
//! Persists a hierarchically namespaced application state tree into an
//! asynchronous key-value store and rehydrates it on startup.
//!
//! ## Core Concepts
//!
//! - **Nodes**: each node of the tree owns its own fields and named children
//! - **Keys**: a node's path flattens to one storage key (`storage/cart/`)
//! - **Policies**: per-node allow/deny declarations decide which fields persist
//! - **Hydration**: stored blobs are deep-merged over the declared defaults
//! - **Write-back**: persisting actions write their node's slice after they succeed
//! - **Snapshots**: flat key/blob maps that can be exported and re-imported
//!
//! ## Example
//!
//! ```ignore
//! use state_vault::{ModuleDefinition, StateVault, VaultConfig};
//! use serde_json::json;
//!
//! let definition = ModuleDefinition::new(json!({"user": null}))?
//!     .deny("session_token")
//!     .child("cart", ModuleDefinition::new(json!({"items": []}))?);
//!
//! let vault = StateVault::open(VaultConfig::default(), &definition)?;
//!
//! // Hold startup until persisted state has been merged in
//! vault.start_app().await?;
//!
//! // Export everything under the cart for backup
//! let snapshot = vault.export_keys(&["cart".to_string()]).await?;
//! ```

pub mod error;
pub mod hydrate;
pub mod lifecycle;
pub mod namespace;
pub mod policy;
pub mod snapshot;
pub mod storage;
pub mod tree;
pub mod types;
pub mod vault;
pub mod writeback;

// Re-exports
pub use error::{Result, VaultError};
pub use hydrate::{merge_into, merged};
pub use lifecycle::{LifecycleCoordinator, START_BARRIER};
pub use namespace::{decode, encode, StorageKey};
pub use policy::FieldPolicyRegistry;
pub use snapshot::{LoadOptions, LoadSummary, Snapshot};
pub use storage::{BackendConfig, FileStorage, MemoryStorage, StorageAdapter};
pub use tree::{ModuleDefinition, TreeNode, TreeShape};
pub use types::*;
pub use vault::{StateVault, VaultConfig, DEFAULT_ROOT_KEY};
pub use writeback::{ActionContext, ActionHandler, PersistingAction, WriteBack};
