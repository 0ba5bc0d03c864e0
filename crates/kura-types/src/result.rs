//! Operation outcomes.
//!
//! Backend failures that an agent can correct (missing file, ambiguous
//! edit, already exists) are carried here as data rather than raised.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::record::FileUpdate;

/// Outcome of a `write` or `edit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Human/agent-readable failure message. `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Path that was written or edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Number of replacements made by an edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<usize>,
    /// Change the caller must merge into shared state.
    ///
    /// Only set by backends whose storage is owned by someone else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<FileUpdate>,
}

impl OperationResult {
    /// A failed operation.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A successful write.
    pub fn written(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// A successful edit.
    pub fn edited(path: impl Into<String>, occurrences: usize) -> Self {
        Self {
            path: Some(path.into()),
            occurrences: Some(occurrences),
            ..Self::default()
        }
    }

    /// Attach a shared-state update.
    pub fn with_update(mut self, update: FileUpdate) -> Self {
        self.update = Some(update);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Machine-readable failure codes for batch upload/download.
///
/// These are the only codes callers should branch on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileOperationError {
    FileNotFound,
    PermissionDenied,
    IsDirectory,
    InvalidPath,
}

impl FileOperationError {
    /// Classify an I/O error, falling back to `InvalidPath`.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::FileNotFound,
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::IsADirectory => Self::IsDirectory,
            _ => Self::InvalidPath,
        }
    }
}

/// Per-item upload result. Order matches the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileOperationError>,
}

impl UploadResponse {
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: None,
        }
    }

    pub fn failed(path: impl Into<String>, error: FileOperationError) -> Self {
        Self {
            path: path.into(),
            error: Some(error),
        }
    }
}

/// Per-item download result. Order matches the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileOperationError>,
}

impl DownloadResponse {
    pub fn ok(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content: Some(content),
            error: None,
        }
    }

    pub fn failed(path: impl Into<String>, error: FileOperationError) -> Self {
        Self {
            path: path.into(),
            content: None,
            error: Some(error),
        }
    }
}

/// Result of running a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Combined stdout and stderr.
    pub output: String,
    /// Process exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Whether `output` was cut short.
    #[serde(default)]
    pub truncated: bool,
}

impl ExecuteResponse {
    pub fn new(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            output: output.into(),
            exit_code,
            truncated: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}
