//! Storage error types.
//!
//! Only two kinds of failure are raised: malformed input caught before any
//! I/O (invalid or escaping paths) and infrastructure failures (store down,
//! remote command channel broken). Everything an agent can correct is
//! returned as data by the backend operations instead.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Storage error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path failed validation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Path resolves outside the sandbox root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Key/value store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Remote command channel failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Capability not provided by this backend.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// (De)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Create an InvalidPath error.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(msg: impl Into<String>) -> Self {
        Self::PathEscapesRoot(msg.into())
    }

    /// Create a Store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a Transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for errors raised before any I/O was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidPath(_) | Self::PathEscapesRoot(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Other(format!("worker task failed: {}", e))
    }
}

/// Storage result type.
pub type StorageResult<T> = Result<T, StorageError>;
