//! EditFileEngine: exact string replacement in an existing file.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::{ExecResult, ExecutionEngine};

use super::{FileToolContext, parse_params, storage_failure};

pub struct EditFileEngine {
    ctx: Arc<FileToolContext>,
}

impl EditFileEngine {
    pub fn new(ctx: Arc<FileToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct EditParams {
    file_path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl ExecutionEngine for EditFileEngine {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file; the string must be unique unless replace_all is set"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path of the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default false)"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.edit_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: EditParams = match parse_params(params) {
            Ok(v) => v,
            Err(result) => return Ok(result),
        };
        let path = match self.ctx.validate(&p.file_path) {
            Ok(path) => path,
            Err(e) => return storage_failure(e),
        };

        let backend = self.ctx.backend()?;
        let result = backend
            .edit(&path, &p.old_string, &p.new_string, p.replace_all)
            .await?;
        if let Some(error) = result.error {
            return Ok(ExecResult::failure(1, error));
        }
        self.ctx.apply(&result);
        Ok(ExecResult::success(format!(
            "Successfully replaced {} instance(s) of the string in '{}'",
            result.occurrences.unwrap_or(0),
            result.path.unwrap_or(path)
        )))
    }

    async fn is_available(&self) -> bool {
        true
    }
}
