//! Composite backend with longest-prefix routing.
//!
//! Routes file operations to backends by virtual path prefix, falling back
//! to a default backend. For example, with routes `/memories/` and
//! `/memories/shared/`, the path `/memories/shared/a.md` is handled by the
//! `/memories/shared/` backend as `/a.md`.
//!
//! Searches that are unscoped (or scoped to `/`) fan out to the default
//! backend and every route; searches scoped under a route prefix only reach
//! that route. Paths coming back from a routed backend are re-prefixed so
//! callers always see the address they used.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use kura_types::{
    DownloadResponse, FileOperationError, FileUpdate, ListEntry, OperationResult, UploadResponse,
};

use crate::backend::{Sandbox, StorageBackend, TextSearch};
use crate::error::{StorageError, StorageResult};

/// Receives write/edit side effects after the router has dispatched them.
///
/// The router calls this for every result that carries a [`FileUpdate`],
/// whichever backend produced it.
pub trait UpdateHook: Send + Sync {
    fn on_update(&self, update: &FileUpdate);
}

struct Route {
    /// Normalized prefix: leading and trailing `/`.
    prefix: String,
    backend: Arc<dyn StorageBackend>,
}

impl Route {
    /// The prefix without its trailing slash, for re-prefixing results.
    fn mount(&self) -> &str {
        &self.prefix[..self.prefix.len() - 1]
    }
}

/// A resolved path: the backend to call and the path to give it.
pub struct Resolved<'a> {
    pub backend: &'a Arc<dyn StorageBackend>,
    pub path: String,
    /// The matching route prefix, `None` for the default backend.
    pub prefix: Option<&'a str>,
}

/// Dispatches operations to backends by path prefix.
pub struct CompositeBackend {
    default: Arc<dyn StorageBackend>,
    /// Sorted by prefix length, longest first.
    routes: Vec<Route>,
    hook: Option<Arc<dyn UpdateHook>>,
}

impl std::fmt::Debug for CompositeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: Vec<(&str, &str)> = self
            .routes
            .iter()
            .map(|r| (r.prefix.as_str(), r.backend.name()))
            .collect();
        f.debug_struct("CompositeBackend")
            .field("default", &self.default.name())
            .field("routes", &routes)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl CompositeBackend {
    pub fn new(default: Arc<dyn StorageBackend>) -> Self {
        Self {
            default,
            routes: Vec::new(),
            hook: None,
        }
    }

    /// Route `prefix` to `backend`, replacing any existing route there.
    pub fn with_route(mut self, prefix: &str, backend: Arc<dyn StorageBackend>) -> Self {
        let prefix = normalize_prefix(prefix);
        self.routes.retain(|r| r.prefix != prefix);
        self.routes.push(Route { prefix, backend });
        self.routes
            .sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        self
    }

    /// Install the post-write hook.
    pub fn with_update_hook(mut self, hook: Arc<dyn UpdateHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn default_backend(&self) -> &Arc<dyn StorageBackend> {
        &self.default
    }

    /// Configured prefixes, longest first.
    pub fn route_prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.prefix.as_str())
    }

    fn find_route(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| path == r.mount() || path.starts_with(&r.prefix))
    }

    /// Find the backend for `path` and the path relative to it.
    pub fn resolve(&self, path: &str) -> Resolved<'_> {
        match self.find_route(path) {
            Some(route) => {
                let rest = path.strip_prefix(&route.prefix).unwrap_or("");
                let stripped = format!("/{}", rest);
                tracing::debug!(path, prefix = %route.prefix, stripped = %stripped, "routed");
                Resolved {
                    backend: &route.backend,
                    path: stripped,
                    prefix: Some(route.mount()),
                }
            }
            None => Resolved {
                backend: &self.default,
                path: path.to_string(),
                prefix: None,
            },
        }
    }

    /// Hand the result's update to the hook and restore the caller's path.
    fn finish_write(&self, mut result: OperationResult, original: &str) -> OperationResult {
        if let (Some(hook), Some(update)) = (&self.hook, &result.update) {
            hook.on_update(update);
        }
        if result.path.is_some() {
            result.path = Some(original.to_string());
        }
        result
    }

    fn is_unscoped(path: Option<&str>) -> bool {
        matches!(path, None | Some("/") | Some(""))
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

fn restore_prefix(entries: Vec<ListEntry>, prefix: Option<&str>) -> Vec<ListEntry> {
    match prefix {
        Some(p) => entries.into_iter().map(|e| e.prefixed(p)).collect(),
        None => entries,
    }
}

/// One backend's share of a batch: original indices and stripped items.
struct Group<T> {
    backend: Arc<dyn StorageBackend>,
    indices: Vec<usize>,
    items: Vec<T>,
}

#[async_trait]
impl StorageBackend for CompositeBackend {
    fn name(&self) -> &str {
        "composite"
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<ListEntry>> {
        if path == "/" || path.is_empty() {
            let mut entries = self.default.list("/").await?;
            entries.extend(self.routes.iter().map(|r| ListEntry::directory(r.mount())));
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            return Ok(entries);
        }
        let resolved = self.resolve(path);
        let entries = resolved.backend.list(&resolved.path).await?;
        Ok(restore_prefix(entries, resolved.prefix))
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String> {
        let resolved = self.resolve(path);
        resolved.backend.read(&resolved.path, offset, limit).await
    }

    async fn search_text(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> StorageResult<TextSearch> {
        if !Self::is_unscoped(path) {
            let resolved = self.resolve(path.unwrap_or("/"));
            let found = resolved
                .backend
                .search_text(pattern, Some(&resolved.path), glob)
                .await?;
            return Ok(found.map(|matches| match resolved.prefix {
                Some(p) => matches.into_iter().map(|m| m.prefixed(p)).collect(),
                None => matches,
            }));
        }

        let routed = self.routes.iter().map(|route| async move {
            let found = route.backend.search_text(pattern, Some("/"), glob).await?;
            Ok::<_, StorageError>(found.map(|matches| {
                matches
                    .into_iter()
                    .map(|m| m.prefixed(route.mount()))
                    .collect::<Vec<_>>()
            }))
        });
        let (default, routed) = futures::try_join!(
            self.default.search_text(pattern, path, glob),
            try_join_all(routed)
        )?;

        let mut all = match default {
            Ok(matches) => matches,
            Err(message) => return Ok(Err(message)),
        };
        for found in routed {
            match found {
                Ok(matches) => all.extend(matches),
                Err(message) => return Ok(Err(message)),
            }
        }
        Ok(Ok(all))
    }

    async fn search_glob(&self, pattern: &str, path: &str) -> StorageResult<Vec<ListEntry>> {
        if !Self::is_unscoped(Some(path)) {
            let resolved = self.resolve(path);
            let entries = resolved.backend.search_glob(pattern, &resolved.path).await?;
            return Ok(restore_prefix(entries, resolved.prefix));
        }

        let routed = self.routes.iter().map(|route| async move {
            let entries = route.backend.search_glob(pattern, "/").await?;
            Ok::<_, StorageError>(restore_prefix(entries, Some(route.mount())))
        });
        let (mut all, routed) = futures::try_join!(
            self.default.search_glob(pattern, "/"),
            try_join_all(routed)
        )?;
        all.extend(routed.into_iter().flatten());
        Ok(all)
    }

    async fn write(&self, path: &str, content: &str) -> StorageResult<OperationResult> {
        let resolved = self.resolve(path);
        let result = resolved.backend.write(&resolved.path, content).await?;
        Ok(self.finish_write(result, path))
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult> {
        let resolved = self.resolve(path);
        let result = resolved
            .backend
            .edit(&resolved.path, old, new, replace_all)
            .await?;
        Ok(self.finish_write(result, path))
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>> {
        let originals: Vec<String> = files.iter().map(|(p, _)| p.clone()).collect();
        let mut groups: Vec<Group<(String, Vec<u8>)>> = Vec::new();
        for (idx, (path, bytes)) in files.into_iter().enumerate() {
            let resolved = self.resolve(&path);
            let item = (resolved.path, bytes);
            push_grouped(&mut groups, resolved.backend, idx, item);
        }

        let calls = groups.into_iter().map(|group| async move {
            let responses = group.backend.upload_batch(group.items).await?;
            if responses.len() != group.indices.len() {
                tracing::warn!(
                    backend = group.backend.name(),
                    expected = group.indices.len(),
                    got = responses.len(),
                    "short batch upload response"
                );
            }
            Ok::<_, StorageError>((group.indices, responses))
        });

        let mut slots: Vec<Option<UploadResponse>> = vec![None; originals.len()];
        for (indices, responses) in try_join_all(calls).await? {
            for (idx, mut response) in indices.into_iter().zip(responses) {
                response.path = originals[idx].clone();
                slots[idx] = Some(response);
            }
        }

        Ok(slots
            .into_iter()
            .zip(originals)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| UploadResponse::failed(path, FileOperationError::InvalidPath))
            })
            .collect())
    }

    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>> {
        let mut groups: Vec<Group<String>> = Vec::new();
        for (idx, path) in paths.iter().enumerate() {
            let resolved = self.resolve(path);
            push_grouped(&mut groups, resolved.backend, idx, resolved.path);
        }

        let calls = groups.into_iter().map(|group| async move {
            let responses = group.backend.download_batch(group.items).await?;
            if responses.len() != group.indices.len() {
                tracing::warn!(
                    backend = group.backend.name(),
                    expected = group.indices.len(),
                    got = responses.len(),
                    "short batch download response"
                );
            }
            Ok::<_, StorageError>((group.indices, responses))
        });

        let mut slots: Vec<Option<DownloadResponse>> = vec![None; paths.len()];
        for (indices, responses) in try_join_all(calls).await? {
            for (idx, mut response) in indices.into_iter().zip(responses) {
                response.path = paths[idx].clone();
                slots[idx] = Some(response);
            }
        }

        Ok(slots
            .into_iter()
            .zip(paths)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| {
                    DownloadResponse::failed(path, FileOperationError::FileNotFound)
                })
            })
            .collect())
    }

    fn as_sandbox(&self) -> Option<&dyn Sandbox> {
        self.default.as_sandbox()
    }
}

/// Add an item to the group for `backend`, creating it on first sight.
/// Groups are keyed by backend identity, not by route.
fn push_grouped<T>(
    groups: &mut Vec<Group<T>>,
    backend: &Arc<dyn StorageBackend>,
    idx: usize,
    item: T,
) {
    match groups.iter_mut().find(|g| Arc::ptr_eq(&g.backend, backend)) {
        Some(group) => {
            group.indices.push(idx);
            group.items.push(item);
        }
        None => groups.push(Group {
            backend: Arc::clone(backend),
            indices: vec![idx],
            items: vec![item],
        }),
    }
}
