//! Ephemeral per-conversation backend.
//!
//! Files live in a map owned by the surrounding runtime ([`EphemeralState`]).
//! The backend only holds a handle: `write` and `edit` never touch the map
//! themselves, they return a [`FileUpdate`] the owner merges in. Listing
//! reconstructs directories from key prefixes on the fly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use kura_types::{
    DownloadResponse, FileOperationError, FileRecord, FileUpdate, ListEntry, OperationResult,
    UploadResponse,
};

use crate::backend::{StorageBackend, TextSearch, offload};
use crate::error::StorageResult;
use crate::format;
use crate::router::UpdateHook;

use super::records;

/// Shared path → record map for one conversation.
///
/// Cloning shares the underlying map. The runtime is expected to serialize
/// operations within a conversation.
#[derive(Debug, Clone, Default)]
pub struct EphemeralState {
    files: Arc<RwLock<HashMap<String, FileRecord>>>,
}

impl EphemeralState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state pre-populated with records.
    pub fn from_records(records: impl IntoIterator<Item = (String, FileRecord)>) -> Self {
        Self {
            files: Arc::new(RwLock::new(records.into_iter().collect())),
        }
    }

    /// Clone of the record at `path`.
    pub fn get(&self, path: &str) -> Option<FileRecord> {
        self.files.read().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Merge an update into the map.
    pub fn apply(&self, update: &FileUpdate) {
        update.apply_to(&mut self.files.write());
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> HashMap<String, FileRecord> {
        self.files.read().clone()
    }
}

impl UpdateHook for EphemeralState {
    fn on_update(&self, update: &FileUpdate) {
        self.apply(update);
    }
}

/// Backend over an [`EphemeralState`].
#[derive(Debug, Clone)]
pub struct EphemeralBackend {
    state: EphemeralState,
}

impl EphemeralBackend {
    pub fn new(state: EphemeralState) -> Self {
        Self { state }
    }

    /// The shared state this backend reads from.
    pub fn state(&self) -> &EphemeralState {
        &self.state
    }

    fn list_sync(&self, path: &str) -> Vec<ListEntry> {
        let files = self.state.files.read();
        records::list_records(files.iter().map(|(k, v)| (k.as_str(), v)), path)
    }

    fn read_sync(&self, path: &str, offset: usize, limit: usize) -> String {
        match self.state.files.read().get(path) {
            Some(record) => format::format_read_response(record, offset, limit),
            None => format::file_not_found(path),
        }
    }

    fn write_sync(&self, path: &str, content: &str) -> OperationResult {
        if self.state.contains(path) {
            return OperationResult::failed(format::already_exists(path));
        }
        OperationResult::written(path).with_update(FileUpdate::upsert(path, FileRecord::new(content)))
    }

    fn edit_sync(&self, path: &str, old: &str, new: &str, replace_all: bool) -> OperationResult {
        let Some(record) = self.state.get(path) else {
            return OperationResult::failed(format::file_not_found(path));
        };
        match format::perform_string_replacement(&record.content(), old, new, replace_all) {
            Ok((content, occurrences)) => OperationResult::edited(path, occurrences)
                .with_update(FileUpdate::upsert(path, record.with_content(&content))),
            Err(message) => OperationResult::failed(message),
        }
    }

    fn search_text_sync(&self, pattern: &str, path: Option<&str>, glob: Option<&str>) -> TextSearch {
        let files = self.state.files.read();
        records::grep_records(files.iter().map(|(k, v)| (k.as_str(), v)), pattern, path, glob)
    }

    fn search_glob_sync(&self, pattern: &str, path: &str) -> Vec<ListEntry> {
        let files = self.state.files.read();
        records::glob_records(files.iter().map(|(k, v)| (k.as_str(), v)), pattern, path)
    }

    /// Uploads have no side-effect channel, so they go straight into the map.
    fn upload_sync(&self, files: Vec<(String, Vec<u8>)>) -> Vec<UploadResponse> {
        let mut map = self.state.files.write();
        files
            .into_iter()
            .map(|(path, bytes)| {
                if !path.starts_with('/') {
                    return UploadResponse::failed(path, FileOperationError::InvalidPath);
                }
                let content = String::from_utf8_lossy(&bytes);
                let record = match map.get(&path) {
                    Some(existing) => existing.with_content(&content),
                    None => FileRecord::new(&content),
                };
                map.insert(path.clone(), record);
                UploadResponse::ok(path)
            })
            .collect()
    }

    fn download_sync(&self, paths: Vec<String>) -> Vec<DownloadResponse> {
        let map = self.state.files.read();
        paths
            .into_iter()
            .map(|path| match map.get(&path) {
                Some(record) => {
                    let content = record.content().into_bytes();
                    DownloadResponse::ok(path, content)
                }
                None => {
                    let dir = format!("{}/", path.trim_end_matches('/'));
                    if map.keys().any(|k| k.starts_with(&dir)) {
                        DownloadResponse::failed(path, FileOperationError::IsDirectory)
                    } else {
                        DownloadResponse::failed(path, FileOperationError::FileNotFound)
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl StorageBackend for EphemeralBackend {
    fn name(&self) -> &str {
        "ephemeral"
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<ListEntry>> {
        let this = self.clone();
        let path = path.to_owned();
        offload(move || Ok(this.list_sync(&path))).await
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String> {
        let this = self.clone();
        let path = path.to_owned();
        offload(move || Ok(this.read_sync(&path, offset, limit))).await
    }

    async fn search_text(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> StorageResult<TextSearch> {
        let this = self.clone();
        let pattern = pattern.to_owned();
        let path = path.map(str::to_owned);
        let glob = glob.map(str::to_owned);
        offload(move || Ok(this.search_text_sync(&pattern, path.as_deref(), glob.as_deref()))).await
    }

    async fn search_glob(&self, pattern: &str, path: &str) -> StorageResult<Vec<ListEntry>> {
        let this = self.clone();
        let pattern = pattern.to_owned();
        let path = path.to_owned();
        offload(move || Ok(this.search_glob_sync(&pattern, &path))).await
    }

    async fn write(&self, path: &str, content: &str) -> StorageResult<OperationResult> {
        let this = self.clone();
        let path = path.to_owned();
        let content = content.to_owned();
        offload(move || Ok(this.write_sync(&path, &content))).await
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult> {
        let this = self.clone();
        let (path, old, new) = (path.to_owned(), old.to_owned(), new.to_owned());
        offload(move || Ok(this.edit_sync(&path, &old, &new, replace_all))).await
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>> {
        let this = self.clone();
        offload(move || Ok(this.upload_sync(files))).await
    }

    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>> {
        let this = self.clone();
        offload(move || Ok(this.download_sync(paths))).await
    }
}
