//! Error types for the storage layer.

use thiserror::Error;

use crate::patch::PatchError;

/// Storage layer error type.
///
/// Every operation either fully completes or surfaces one of these with no
/// visible partial effect.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("not found")]
    NotFound,
    /// Malformed or rejected caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Patch application could not be completed.
    #[error("patch error: {0}")]
    Patch(#[from] PatchError),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
