//! File records and the explicit update delta applied to shared state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// The unit of stored content: ordered lines plus timestamps.
///
/// Content is split on `\n` only, so `content()` reproduces exactly what was
/// written, including a trailing newline (which becomes a final empty line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Lines of the file, without terminators.
    #[serde(rename = "content")]
    pub lines: Vec<String>,
    /// When the record was first written.
    pub created_at: SystemTime,
    /// When the record content last changed.
    pub modified_at: SystemTime,
}

impl FileRecord {
    /// Create a fresh record stamped with the current time.
    pub fn new(content: &str) -> Self {
        let now = SystemTime::now();
        Self {
            lines: split_lines(content),
            created_at: now,
            modified_at: now,
        }
    }

    /// Replace the content, keeping `created_at` and refreshing `modified_at`.
    pub fn with_content(&self, content: &str) -> Self {
        Self {
            lines: split_lines(content),
            created_at: self.created_at,
            modified_at: SystemTime::now(),
        }
    }

    /// Join the lines back into a single string.
    pub fn content(&self) -> String {
        self.lines.join("\n")
    }

    /// Size of the joined content in bytes.
    pub fn size_bytes(&self) -> u64 {
        let text: usize = self.lines.iter().map(String::len).sum();
        (text + self.lines.len().saturating_sub(1)) as u64
    }
}

fn split_lines(content: &str) -> Vec<String> {
    content.split('\n').map(str::to_owned).collect()
}

/// A change to a path → record map.
///
/// Additions and removals travel together; `delete` wins over an earlier
/// `set` of the same key and vice versa, in the order updates are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    /// Records to insert or overwrite.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, FileRecord>,
    /// Keys to remove.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub delete: BTreeSet<String>,
}

impl FileUpdate {
    /// An update that stores a single record.
    pub fn upsert(path: impl Into<String>, record: FileRecord) -> Self {
        let mut update = Self::default();
        update.set.insert(path.into(), record);
        update
    }

    /// An update that removes a single key.
    pub fn removal(path: impl Into<String>) -> Self {
        let mut update = Self::default();
        update.delete.insert(path.into());
        update
    }

    /// True if applying this update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.delete.is_empty()
    }

    /// Fold a later update into this one.
    pub fn merge(&mut self, later: FileUpdate) {
        for (path, record) in later.set {
            self.delete.remove(&path);
            self.set.insert(path, record);
        }
        for path in later.delete {
            self.set.remove(&path);
            self.delete.insert(path);
        }
    }

    /// Apply this update to a file map.
    pub fn apply_to(&self, files: &mut HashMap<String, FileRecord>) {
        for path in &self.delete {
            files.remove(path);
        }
        for (path, record) in &self.set {
            files.insert(path.clone(), record.clone());
        }
    }
}
