//! LsEngine: list the immediate children of a directory.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::{ExecResult, ExecutionEngine};

use super::{FileToolContext, parse_params, path_listing, storage_failure};

pub struct LsEngine {
    ctx: Arc<FileToolContext>,
}

impl LsEngine {
    pub fn new(ctx: Arc<FileToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct LsParams {
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    "/".to_string()
}

#[async_trait]
impl ExecutionEngine for LsEngine {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List files and directories directly under a path"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute directory path, e.g. / or /memories/"
                }
            }
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.ls")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: LsParams = match parse_params(params) {
            Ok(v) => v,
            Err(result) => return Ok(result),
        };
        let path = match self.ctx.validate(&p.path) {
            Ok(path) => path,
            Err(e) => return storage_failure(e),
        };

        let backend = self.ctx.backend()?;
        let entries = backend.list(&path).await?;
        let paths = entries.into_iter().map(|e| e.path).collect();
        Ok(ExecResult::success(path_listing(paths)))
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
    use serde_json::json;

    #[tokio::test]
    async fn test_ls_shows_files_and_directories() {
        let ctx = ephemeral_ctx();
        let write = WriteFileEngine::new(ctx.clone());
        for path in ["/a.md", "/docs/b.md", "/docs/deep/c.md"] {
            write
                .execute(&params(json!({"file_path": path, "content": "x"})))
                .await
                .unwrap();
        }

        let ls = LsEngine::new(ctx);
        let root = ls.execute(&params(json!({}))).await.unwrap();
        assert_eq!(root.stdout, "/a.md\n/docs/");

        let docs = ls.execute(&params(json!({"path": "/docs"}))).await.unwrap();
        assert_eq!(docs.stdout, "/docs/b.md\n/docs/deep/");

        let empty = ls.execute(&params(json!({"path": "/nothing"}))).await.unwrap();
        assert!(empty.success);
        assert_eq!(empty.stdout, "No files found");
    }
}
