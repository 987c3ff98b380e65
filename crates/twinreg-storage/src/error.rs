//! Registry error types for twinreg-storage.
//!
//! [`RegistryError`] separates "the request names something that does not
//! exist or is malformed" from "the backend could not be reached or
//! misbehaved", so boundary layers can map each to the right status.

use thiserror::Error;

use crate::compose::Action;

/// Errors produced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No shell with the given id is registered.
    #[error("shell not found: {0}")]
    ShellNotFound(String),

    /// The shell exists but has no submodel with the given id.
    #[error("submodel not found: shell={shell_id}, submodel={submodel_id}")]
    SubmodelNotFound {
        shell_id: String,
        submodel_id: String,
    },

    /// An incoming shell carries the same submodel id more than once.
    #[error("duplicate submodel id: {0}")]
    DuplicateSubmodelId(String),

    /// The authorization decorator refused the call.
    #[error("unauthorized: {action} access denied")]
    Unauthorized { action: Action },

    /// The search request cannot be compiled or evaluated.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Optimistic-concurrency retries were exhausted for a document.
    #[error("version conflict on document {0}")]
    VersionConflict(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The search backend could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The search backend answered with an unexpected status.
    #[error("backend error: status={status}: {body}")]
    Backend { status: u16, body: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// The registry configuration is incomplete or contradictory.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RegistryError {
    /// Returns true for the shell- and submodel-level not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::ShellNotFound(_) | RegistryError::SubmodelNotFound { .. }
        )
    }

    pub(crate) fn submodel_not_found(shell_id: &str, submodel_id: &str) -> Self {
        RegistryError::SubmodelNotFound {
            shell_id: shell_id.to_string(),
            submodel_id: submodel_id.to_string(),
        }
    }
}
