//! Error types for the state vault.

use crate::types::CommitHandle;
use thiserror::Error;

/// Main error type for vault operations.
#[derive(Clone, Debug, Error)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage failure on {key}: {message}")]
    Storage { key: String, message: String },

    #[error("Misuse: {0}")]
    Misuse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Path already registered: {0}")]
    PathExists(String),

    #[error("Unknown commit handle: {0:?}")]
    UnknownHandle(CommitHandle),

    #[error("Persistence task failed: {0}")]
    Task(String),
}

impl VaultError {
    /// Build a storage failure for `key` from any displayable cause.
    pub fn storage(key: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        VaultError::Storage {
            key: key.into(),
            message: cause.to_string(),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(e: tokio::task::JoinError) -> Self {
        VaultError::Task(e.to_string())
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
