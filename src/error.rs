//! Error taxonomy for the indexing and retrieval engine.

use crate::model::EntityId;
use thiserror::Error;

/// Errors surfaced by the core to its callers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("entities missing from primary store: {0:?}")]
    MissingEntities(Vec<EntityId>),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("backend error: {0}")]
    BackendError(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported backend: {0}")]
    Unsupported(String),
}

/// Result type used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
