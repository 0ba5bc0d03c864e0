//! The storage backend contract.
//!
//! Every engine (ephemeral map, key/value store, local disk, remote shell)
//! and the composite router implement [`StorageBackend`]. Paths arrive
//! already validated; see [`crate::path::validate_path`].
//!
//! # Error discipline
//!
//! Backends return correctable failures as data: `read` yields an
//! `Error: ...` string, `write`/`edit` fill `OperationResult::error`,
//! `search_text` yields `Err(message)` inside `Ok`, and batch calls record a
//! [`FileOperationError`](kura_types::FileOperationError) per item. The
//! outer [`StorageResult`] is reserved for infrastructure failures.

use async_trait::async_trait;

use kura_types::{
    DownloadResponse, ExecuteResponse, ListEntry, OperationResult, SearchMatch, UploadResponse,
};

use crate::error::StorageResult;
use crate::format::DEFAULT_READ_LIMIT;

/// Matches from a text search, or an agent-facing error message.
pub type TextSearch = Result<Vec<SearchMatch>, String>;

/// Uniform file operations over one storage substrate.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    // ========================================================================
    // Reading
    // ========================================================================

    /// Immediate children of `path`. Unknown or non-directory paths yield
    /// an empty list.
    async fn list(&self, path: &str) -> StorageResult<Vec<ListEntry>>;

    /// Line-numbered content starting at 0-based line `offset`.
    async fn read(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String>;

    /// Literal substring search over file lines under `path`, optionally
    /// restricted to file names matching `glob`.
    async fn search_text(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> StorageResult<TextSearch>;

    /// Files under `path` matching a glob relative to it.
    async fn search_glob(&self, pattern: &str, path: &str) -> StorageResult<Vec<ListEntry>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a new file. Fails (as data) if the path already exists.
    async fn write(&self, path: &str, content: &str) -> StorageResult<OperationResult>;

    /// Exact substring replacement in an existing file.
    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult>;

    // ========================================================================
    // Batch transfer
    // ========================================================================

    /// Store raw bytes at each path, overwriting. One response per input,
    /// in input order.
    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>>;

    /// Fetch raw bytes for each path. One response per input, in input order.
    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>>;

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Command execution, if this backend offers it.
    fn as_sandbox(&self) -> Option<&dyn Sandbox> {
        None
    }

    // ========================================================================
    // Convenience
    // ========================================================================

    /// Read from the top with the default line limit.
    async fn read_all(&self, path: &str) -> StorageResult<String> {
        self.read(path, 0, DEFAULT_READ_LIMIT).await
    }
}

/// A backend that can also run shell commands.
#[async_trait]
pub trait Sandbox: StorageBackend {
    /// Identifier of the execution environment.
    fn id(&self) -> &str;

    /// Run `command` and return combined stdout/stderr and the exit code.
    async fn execute(&self, command: &str) -> StorageResult<ExecuteResponse>;
}

/// Run a blocking closure on the worker pool.
///
/// Used by backends with no genuine concurrency (in-memory map, local disk)
/// to provide their non-blocking form.
pub(crate) async fn offload<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
