//! Persistent backend over a namespaced key/value store.
//!
//! Survives across conversations. Each file is one item whose key is the
//! virtual path and whose value is the serialized [`FileRecord`].
//!
//! Listing and search page through the *whole* namespace and filter by
//! prefix client-side, since stores offer no prefix query. This is linear
//! in the namespace size and has no upper bound; very large namespaces
//! will be slow.

use std::sync::Arc;

use async_trait::async_trait;

use kura_types::{
    DownloadResponse, FileOperationError, FileRecord, ListEntry, OperationResult, UploadResponse,
};

use crate::backend::{StorageBackend, TextSearch};
use crate::error::{StorageError, StorageResult};
use crate::format;
use crate::store::{KeyValueStore, StoreItem, filesystem_namespace};

use super::records;

/// Items fetched per store round trip while paging.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Backend storing files in a [`KeyValueStore`].
#[derive(Clone)]
pub struct PersistentBackend {
    store: Arc<dyn KeyValueStore>,
    namespace: Vec<String>,
    page_size: usize,
}

impl std::fmt::Debug for PersistentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentBackend")
            .field("namespace", &self.namespace)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl PersistentBackend {
    /// Backend over the shared `["filesystem"]` namespace.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            namespace: filesystem_namespace(None),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Partition storage under `[agent_id, "filesystem"]`.
    pub fn with_agent_id(mut self, agent_id: Option<&str>) -> Self {
        self.namespace = filesystem_namespace(agent_id);
        self
    }

    /// Override the paging size. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// Fetch every item in the namespace, one page at a time, until a short
    /// page comes back.
    async fn fetch_all(&self) -> StorageResult<Vec<StoreItem>> {
        let mut items = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .store
                .search(&self.namespace, self.page_size, offset)
                .await?;
            let fetched = page.len();
            items.extend(page);
            if fetched < self.page_size {
                break;
            }
            offset += self.page_size;
        }
        tracing::trace!(count = items.len(), namespace = ?self.namespace, "paged namespace");
        Ok(items)
    }

    /// Every well-formed record in the namespace. Malformed items are skipped.
    async fn fetch_records(&self) -> StorageResult<Vec<(String, FileRecord)>> {
        Ok(self
            .fetch_all()
            .await?
            .into_iter()
            .filter_map(|item| match decode(&item) {
                Ok(record) => Some((item.key, record)),
                Err(e) => {
                    tracing::warn!(key = %item.key, error = %e, "skipping malformed store item");
                    None
                }
            })
            .collect())
    }

    async fn get_record(&self, path: &str) -> StorageResult<Option<FileRecord>> {
        match self.store.get(&self.namespace, path).await? {
            Some(item) => decode(&item)
                .map(Some)
                .map_err(|e| StorageError::store(format!("invalid file data at {}: {}", path, e))),
            None => Ok(None),
        }
    }

    async fn put_record(&self, path: &str, record: &FileRecord) -> StorageResult<()> {
        let value = serde_json::to_value(record)?;
        self.store.put(&self.namespace, path, value).await
    }
}

fn decode(item: &StoreItem) -> Result<FileRecord, serde_json::Error> {
    serde_json::from_value(item.value.clone())
}

fn pairs(records: &[(String, FileRecord)]) -> impl Iterator<Item = (&str, &FileRecord)> {
    records.iter().map(|(k, v)| (k.as_str(), v))
}

#[async_trait]
impl StorageBackend for PersistentBackend {
    fn name(&self) -> &str {
        "persistent"
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<ListEntry>> {
        let records = self.fetch_records().await?;
        Ok(records::list_records(pairs(&records), path))
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String> {
        Ok(match self.get_record(path).await? {
            Some(record) => format::format_read_response(&record, offset, limit),
            None => format::file_not_found(path),
        })
    }

    async fn search_text(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> StorageResult<TextSearch> {
        let records = self.fetch_records().await?;
        Ok(records::grep_records(pairs(&records), pattern, path, glob))
    }

    async fn search_glob(&self, pattern: &str, path: &str) -> StorageResult<Vec<ListEntry>> {
        let records = self.fetch_records().await?;
        Ok(records::glob_records(pairs(&records), pattern, path))
    }

    async fn write(&self, path: &str, content: &str) -> StorageResult<OperationResult> {
        if self.store.get(&self.namespace, path).await?.is_some() {
            return Ok(OperationResult::failed(format::already_exists(path)));
        }
        self.put_record(path, &FileRecord::new(content)).await?;
        Ok(OperationResult::written(path))
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult> {
        let Some(record) = self.get_record(path).await? else {
            return Ok(OperationResult::failed(format::file_not_found(path)));
        };
        match format::perform_string_replacement(&record.content(), old, new, replace_all) {
            Ok((content, occurrences)) => {
                self.put_record(path, &record.with_content(&content)).await?;
                Ok(OperationResult::edited(path, occurrences))
            }
            Err(message) => Ok(OperationResult::failed(message)),
        }
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>> {
        let mut responses = Vec::with_capacity(files.len());
        for (path, bytes) in files {
            if !path.starts_with('/') {
                responses.push(UploadResponse::failed(path, FileOperationError::InvalidPath));
                continue;
            }
            let content = String::from_utf8_lossy(&bytes);
            let record = match self.store.get(&self.namespace, &path).await? {
                Some(item) => match decode(&item) {
                    Ok(existing) => existing.with_content(&content),
                    Err(_) => FileRecord::new(&content),
                },
                None => FileRecord::new(&content),
            };
            self.put_record(&path, &record).await?;
            responses.push(UploadResponse::ok(path));
        }
        Ok(responses)
    }

    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>> {
        let mut responses = Vec::with_capacity(paths.len());
        for path in paths {
            let response = match self.store.get(&self.namespace, &path).await? {
                Some(item) => match decode(&item) {
                    Ok(record) => DownloadResponse::ok(path, record.content().into_bytes()),
                    Err(e) => {
                        tracing::warn!(key = %path, error = %e, "malformed store item");
                        DownloadResponse::failed(path, FileOperationError::InvalidPath)
                    }
                },
                None => DownloadResponse::failed(path, FileOperationError::FileNotFound),
            };
            responses.push(response);
        }
        Ok(responses)
    }
}
