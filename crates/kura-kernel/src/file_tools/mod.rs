//! File tools for agents.
//!
//! Provides ls, read_file, write_file, edit_file, glob, grep and execute
//! engines that operate through a resolved [`StorageBackend`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Agent tool calls             │
//! └────────────────────┬────────────────────┘
//!                      │ JSON params
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           File Tool Engines             │
//! │  (ls, read, write, edit, glob, grep,    │
//! │   execute)                              │
//! └────────────────────┬────────────────────┘
//!                      │ validate_path, BackendSource::resolve
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   CompositeBackend / any backend        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Path validation failures and backend errors come back as failed
//! [`ExecResult`]s so the agent can correct itself. Infrastructure failures
//! propagate as `Err`.

pub mod edit;
pub mod execute;
pub mod glob;
pub mod grep;
pub mod ls;
pub mod read;
pub mod write;

pub use edit::EditFileEngine;
pub use execute::ExecuteEngine;
pub use glob::GlobEngine;
pub use grep::{GrepEngine, OutputMode, format_grep_matches};
pub use ls::LsEngine;
pub use read::ReadFileEngine;
pub use write::WriteFileEngine;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use kura_types::OperationResult;

use crate::backend::StorageBackend;
use crate::context::{BackendSource, CallContext};
use crate::error::{StorageError, StorageResult};
use crate::format;
use crate::path::validate_path;
use crate::tools::{ExecResult, ToolInfo, ToolRegistry};

/// Shared state for the file tool engines.
#[derive(Debug, Clone)]
pub struct FileToolContext {
    source: BackendSource,
    call: CallContext,
    allowed_prefixes: Option<Vec<String>>,
}

impl FileToolContext {
    pub fn new(source: BackendSource, call: CallContext) -> Self {
        Self {
            source,
            call,
            allowed_prefixes: None,
        }
    }

    /// Restrict every tool path to these prefixes.
    pub fn with_allowed_prefixes(mut self, prefixes: Option<Vec<String>>) -> Self {
        self.allowed_prefixes = prefixes;
        self
    }

    pub fn call_context(&self) -> &CallContext {
        &self.call
    }

    pub(crate) fn backend(&self) -> StorageResult<Arc<dyn StorageBackend>> {
        self.source.resolve(&self.call)
    }

    pub(crate) fn validate(&self, path: &str) -> StorageResult<String> {
        validate_path(path, self.allowed_prefixes.as_deref())
    }

    /// Merge a write's side effect into the conversation state.
    pub(crate) fn apply(&self, result: &OperationResult) {
        if let Some(update) = &result.update {
            self.call.state.apply(update);
        }
    }
}

/// Register all file tools, including execute.
pub fn register_file_tools(registry: &mut ToolRegistry, ctx: Arc<FileToolContext>) {
    registry.register_with_engine(
        ToolInfo::new("ls", "List files in a directory", "filesystem"),
        Arc::new(LsEngine::new(ctx.clone())),
    );
    registry.register_with_engine(
        ToolInfo::new("read_file", "Read a file with line numbers", "filesystem"),
        Arc::new(ReadFileEngine::new(ctx.clone())),
    );
    registry.register_with_engine(
        ToolInfo::new("write_file", "Create a new file", "filesystem"),
        Arc::new(WriteFileEngine::new(ctx.clone())),
    );
    registry.register_with_engine(
        ToolInfo::new("edit_file", "Replace exact strings in a file", "filesystem"),
        Arc::new(EditFileEngine::new(ctx.clone())),
    );
    registry.register_with_engine(
        ToolInfo::new("glob", "Find files by glob pattern", "filesystem"),
        Arc::new(GlobEngine::new(ctx.clone())),
    );
    registry.register_with_engine(
        ToolInfo::new("grep", "Search file contents for literal text", "filesystem"),
        Arc::new(GrepEngine::new(ctx.clone())),
    );
    registry.register_with_engine(
        ToolInfo::new("execute", "Run a shell command in the sandbox", "shell"),
        Arc::new(ExecuteEngine::new(ctx)),
    );
}

pub(crate) fn parse_params<T: DeserializeOwned>(params: &str) -> Result<T, ExecResult> {
    serde_json::from_str(params).map_err(|e| ExecResult::failure(1, format!("Invalid params: {}", e)))
}

/// Validation errors become failed results; anything else propagates.
pub(crate) fn storage_failure(err: StorageError) -> anyhow::Result<ExecResult> {
    if err.is_validation() {
        Ok(ExecResult::failure(1, format!("Error: {}", err)))
    } else {
        Err(err.into())
    }
}

/// Newline-joined paths, or "No files found".
pub(crate) fn path_listing(paths: Vec<String>) -> String {
    if paths.is_empty() {
        return "No files found".to_string();
    }
    format::truncate_list_if_too_long(paths).join("\n")
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::tools::ExecutionEngine;
    use serde_json::json;

    #[tokio::test]
    async fn test_registered_tools_share_state() {
        let mut registry = ToolRegistry::new();
        register_file_tools(&mut registry, ephemeral_ctx());
        let names: Vec<&str> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["edit_file", "execute", "glob", "grep", "ls", "read_file", "write_file"]
        );

        let written = registry
            .execute(
                "write_file",
                &params(json!({"file_path": "/notes.md", "content": "hello"})),
            )
            .await
            .unwrap();
        assert_eq!(written.stdout, "Updated file /notes.md");

        let listing = registry
            .execute("ls", &params(json!({"path": "/"})))
            .await
            .unwrap();
        assert_eq!(listing.stdout, "/notes.md");
    }

    #[tokio::test]
    async fn test_invalid_path_is_a_failed_result() {
        let mut registry = ToolRegistry::new();
        register_file_tools(&mut registry, ephemeral_ctx());
        let result = registry
            .execute("read_file", &params(json!({"file_path": "../etc/passwd"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.stderr.contains("invalid path"));
    }

    #[tokio::test]
    async fn test_allowed_prefixes() {
        let ctx = FileToolContext::new(BackendSource::ephemeral(), CallContext::default())
            .with_allowed_prefixes(Some(vec!["/work/".to_string()]));
        let engine = WriteFileEngine::new(Arc::new(ctx));

        let denied = engine
            .execute(&params(json!({"file_path": "/etc/x", "content": ""})))
            .await
            .unwrap();
        assert!(!denied.success);
        let allowed = engine
            .execute(&params(json!({"file_path": "/work/x", "content": ""})))
            .await
            .unwrap();
        assert!(allowed.success);
    }

    #[test]
    fn test_bad_params() {
        let err = parse_params::<serde_json::Value>("{not json").unwrap_err();
        assert!(err.stderr.starts_with("Invalid params"));
    }
}
