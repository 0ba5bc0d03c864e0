//! ReadFileEngine: line-numbered, windowed file reads.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::format::DEFAULT_READ_LIMIT;
use crate::tools::{ExecResult, ExecutionEngine};

use super::{FileToolContext, parse_params, storage_failure};

pub struct ReadFileEngine {
    ctx: Arc<FileToolContext>,
}

impl ReadFileEngine {
    pub fn new(ctx: Arc<FileToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct ReadParams {
    file_path: String,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_READ_LIMIT
}

#[async_trait]
impl ExecutionEngine for ReadFileEngine {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file with line numbers, optionally a window of lines"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path of the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Start line (0-indexed). Omit to read from the beginning."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)"
                }
            },
            "required": ["file_path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.read_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: ReadParams = match parse_params(params) {
            Ok(v) => v,
            Err(result) => return Ok(result),
        };
        let path = match self.ctx.validate(&p.file_path) {
            Ok(path) => path,
            Err(e) => return storage_failure(e),
        };

        let backend = self.ctx.backend()?;
        let text = backend.read(&path, p.offset, p.limit).await?;
        if text.starts_with("Error:") {
            return Ok(ExecResult::failure(1, text));
        }
        Ok(ExecResult::success(text))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_tools::WriteFileEngine;
    use crate::file_tools::test_support::{ephemeral_ctx, params};
    use crate::format::EMPTY_CONTENT_WARNING;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_window_and_errors() {
        let ctx = ephemeral_ctx();
        let write = WriteFileEngine::new(ctx.clone());
        write
            .execute(&params(json!({"file_path": "/f.txt", "content": "a\nb\nc\nd"})))
            .await
            .unwrap();
        write
            .execute(&params(json!({"file_path": "/empty.txt", "content": ""})))
            .await
            .unwrap();

        let read = ReadFileEngine::new(ctx);
        let window = read
            .execute(&params(json!({"file_path": "/f.txt", "offset": 1, "limit": 2})))
            .await
            .unwrap();
        assert!(window.success);
        assert_eq!(window.stdout, "     2\tb\n     3\tc");

        let missing = read
            .execute(&params(json!({"file_path": "/nope.txt"})))
            .await
            .unwrap();
        assert!(!missing.success);
        assert_eq!(missing.stderr, "Error: File '/nope.txt' not found");

        let empty = read
            .execute(&params(json!({"file_path": "/empty.txt"})))
            .await
            .unwrap();
        assert_eq!(empty.stdout, EMPTY_CONTENT_WARNING);
    }
}
