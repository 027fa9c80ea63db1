use thiserror::Error;

use crate::services::{DirectoryError, StoreError};

/// Errors reported by the engine to its callers
///
/// None of these are retried internally. A failed operation leaves
/// relationship and message state unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("profile directory error: {0}")]
    Directory(DirectoryError),
}

impl From<DirectoryError> for EngineError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Directory(other),
        }
    }
}

impl EngineError {
    pub fn not_matched() -> Self {
        EngineError::Authorization("you can only message matched users".to_string())
    }

    /// Short machine-readable kind used in error responses
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::Authorization(_) => "authorization_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::Store(_) => "storage_error",
            EngineError::Directory(_) => "directory_error",
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
