//! Shell provider that runs commands on this host with `sh -c`.
//!
//! Pairs with [`ShellBackend`](super::ShellBackend) for tests and for the
//! `kura exec` command. Upload and download go straight to the host
//! filesystem.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use kura_types::{DownloadResponse, ExecuteResponse, FileOperationError, UploadResponse};

use super::shell::RemoteShell;
use crate::config::ShellConfig;
use crate::error::{StorageError, StorageResult};

/// Default deadline for one command; sized for builds and test suites.
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default cap on combined output.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;

#[derive(Debug, Clone)]
pub struct LocalShell {
    id: String,
    cwd: Option<PathBuf>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalShell {
    pub fn new() -> Self {
        Self {
            id: "local".to_string(),
            cwd: None,
            timeout: DEFAULT_EXECUTE_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn from_config(config: &ShellConfig) -> Self {
        let shell = Self::new()
            .with_timeout(Duration::from_secs(config.execute_timeout_secs))
            .with_max_output_bytes(config.max_output_bytes);
        match &config.cwd {
            Some(cwd) => shell.with_cwd(cwd),
            None => shell,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Working directory for commands and relative transfer paths.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    fn host_path(&self, path: &str) -> PathBuf {
        match &self.cwd {
            Some(cwd) if !Path::new(path).is_absolute() => cwd.join(path),
            _ => PathBuf::from(path),
        }
    }

    /// Cut `output` to the byte cap on a char boundary.
    fn cap_output(&self, mut output: String) -> (String, bool) {
        if output.len() <= self.max_output_bytes {
            return (output, false);
        }
        let mut cut = self.max_output_bytes;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        (output, true)
    }
}

#[async_trait]
impl RemoteShell for LocalShell {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, command: &str) -> StorageResult<ExecuteResponse> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd
            .spawn()
            .map_err(|e| StorageError::transport(format!("failed to spawn sh: {}", e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "command timed out");
                return Err(StorageError::Timeout(self.timeout));
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let (combined, truncated) = self.cap_output(combined);

        Ok(ExecuteResponse {
            output: combined,
            exit_code: output.status.code(),
            truncated,
        })
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>> {
        let mut responses = Vec::with_capacity(files.len());
        for (path, bytes) in files {
            let target = self.host_path(&path);
            let written = async {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, bytes).await
            };
            responses.push(match written.await {
                Ok(()) => UploadResponse::ok(path),
                Err(e) => UploadResponse::failed(path, FileOperationError::from_io(&e)),
            });
        }
        Ok(responses)
    }

    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>> {
        let mut responses = Vec::with_capacity(paths.len());
        for path in paths {
            let source = self.host_path(&path);
            let response = match tokio::fs::metadata(&source).await {
                Ok(meta) if meta.is_dir() => {
                    DownloadResponse::failed(path, FileOperationError::IsDirectory)
                }
                Ok(_) => match tokio::fs::read(&source).await {
                    Ok(bytes) => DownloadResponse::ok(path, bytes),
                    Err(e) => DownloadResponse::failed(path, FileOperationError::from_io(&e)),
                },
                Err(e) => DownloadResponse::failed(path, FileOperationError::from_io(&e)),
            };
            responses.push(response);
        }
        Ok(responses)
    }
}
