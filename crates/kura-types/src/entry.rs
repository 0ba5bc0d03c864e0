//! Listing entries and search matches.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// One row of a directory listing or glob result.
///
/// Directories carry a trailing `/` and a zero size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub path: String,
    pub is_dir: bool,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<SystemTime>,
}

impl ListEntry {
    /// A regular file entry.
    pub fn file(path: impl Into<String>, size_bytes: u64, modified_at: Option<SystemTime>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size_bytes,
            modified_at,
        }
    }

    /// A directory entry. A trailing `/` is added if missing.
    pub fn directory(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Self {
            path,
            is_dir: true,
            size_bytes: 0,
            modified_at: None,
        }
    }

    /// Attach a modification time.
    pub fn with_modified(mut self, modified_at: SystemTime) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// Return a copy with `prefix` prepended to the path.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.path = format!("{}{}", prefix, self.path);
        self
    }
}

/// A single matching line from a text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub path: String,
    /// 1-indexed line number.
    pub line: usize,
    pub text: String,
}

impl SearchMatch {
    pub fn new(path: impl Into<String>, line: usize, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            text: text.into(),
        }
    }

    /// Return a copy with `prefix` prepended to the path.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.path = format!("{}{}", prefix, self.path);
        self
    }
}
