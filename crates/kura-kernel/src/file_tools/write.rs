//! WriteFileEngine: create a new file. Existing files are never clobbered.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::{ExecResult, ExecutionEngine};

use super::{FileToolContext, parse_params, storage_failure};

pub struct WriteFileEngine {
    ctx: Arc<FileToolContext>,
}

impl WriteFileEngine {
    pub fn new(ctx: Arc<FileToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct WriteParams {
    file_path: String,
    content: String,
}

#[async_trait]
impl ExecutionEngine for WriteFileEngine {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create a new file. Fails if the file exists; use edit_file to change it."
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path of the file to create"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["file_path", "content"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.write_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: WriteParams = match parse_params(params) {
            Ok(v) => v,
            Err(result) => return Ok(result),
        };
        let path = match self.ctx.validate(&p.file_path) {
            Ok(path) => path,
            Err(e) => return storage_failure(e),
        };

        let backend = self.ctx.backend()?;
        let result = backend.write(&path, &p.content).await?;
        if let Some(error) = result.error {
            return Ok(ExecResult::failure(1, error));
        }
        self.ctx.apply(&result);
        let written = result.path.unwrap_or(path);
        Ok(ExecResult::success(format!("Updated file {}", written)))
    }

    async fn is_available(&self) -> bool {
        true
    }
}
