//! Blocking form of the backend contract.
//!
//! For callers outside any async context (plain threads, FFI, scripts).
//! Each call drives the async operation to completion on a runtime: the
//! ambient one when constructed with [`BlockingBackend::current`], or a
//! private current-thread runtime from [`BlockingBackend::standalone`].
//!
//! Calling these methods from inside an async task panics, as
//! `Handle::block_on` does; async callers use the backend directly.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use kura_types::{DownloadResponse, ExecuteResponse, ListEntry, OperationResult, UploadResponse};

use crate::backend::{StorageBackend, TextSearch};
use crate::error::{StorageError, StorageResult};

enum Driver {
    Handle(Handle),
    Owned(Runtime),
}

/// Synchronous wrapper around any [`StorageBackend`].
pub struct BlockingBackend<B: ?Sized> {
    inner: Arc<B>,
    driver: Driver,
}

impl<B: StorageBackend + ?Sized> BlockingBackend<B> {
    /// Drive operations on the given runtime handle.
    pub fn new(inner: Arc<B>, handle: Handle) -> Self {
        Self {
            inner,
            driver: Driver::Handle(handle),
        }
    }

    /// Use the runtime this thread is already registered with.
    pub fn current(inner: Arc<B>) -> StorageResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| StorageError::other(format!("no tokio runtime: {}", e)))?;
        Ok(Self::new(inner, handle))
    }

    /// Own a private current-thread runtime.
    pub fn standalone(inner: Arc<B>) -> StorageResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner,
            driver: Driver::Owned(runtime),
        })
    }

    pub fn inner(&self) -> &Arc<B> {
        &self.inner
    }

    fn block<F: Future>(&self, fut: F) -> F::Output {
        match &self.driver {
            Driver::Handle(handle) => handle.block_on(fut),
            Driver::Owned(runtime) => runtime.block_on(fut),
        }
    }

    pub fn list(&self, path: &str) -> StorageResult<Vec<ListEntry>> {
        self.block(self.inner.list(path))
    }

    pub fn read(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String> {
        self.block(self.inner.read(path, offset, limit))
    }

    pub fn read_all(&self, path: &str) -> StorageResult<String> {
        self.block(self.inner.read_all(path))
    }

    pub fn write(&self, path: &str, content: &str) -> StorageResult<OperationResult> {
        self.block(self.inner.write(path, content))
    }

    pub fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult> {
        self.block(self.inner.edit(path, old, new, replace_all))
    }

    pub fn search_text(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> StorageResult<TextSearch> {
        self.block(self.inner.search_text(pattern, path, glob))
    }

    pub fn search_glob(&self, pattern: &str, path: &str) -> StorageResult<Vec<ListEntry>> {
        self.block(self.inner.search_glob(pattern, path))
    }

    pub fn upload_batch(&self, files: Vec<(String, Vec<u8>)>) -> StorageResult<Vec<UploadResponse>> {
        self.block(self.inner.upload_batch(files))
    }

    pub fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>> {
        self.block(self.inner.download_batch(paths))
    }

    /// Run a command if the backend is a sandbox.
    pub fn execute(&self, command: &str) -> StorageResult<ExecuteResponse> {
        let sandbox = self
            .inner
            .as_sandbox()
            .ok_or(StorageError::Unsupported("backend does not support command execution"))?;
        self.block(sandbox.execute(command))
    }
}

impl<B: ?Sized> std::fmt::Debug for BlockingBackend<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let driver = match self.driver {
            Driver::Handle(_) => "handle",
            Driver::Owned(_) => "owned",
        };
        f.debug_struct("BlockingBackend")
            .field("driver", &driver)
            .finish_non_exhaustive()
    }
}
