//! GlobEngine: find files by glob pattern.
//!
//! A pattern without `/` or `**` matches only the directory named by
//! `path`; `**` recurses.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::{ExecResult, ExecutionEngine};

use super::{FileToolContext, parse_params, path_listing, storage_failure};

pub struct GlobEngine {
    ctx: Arc<FileToolContext>,
}

impl GlobEngine {
    pub fn new(ctx: Arc<FileToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GlobParams {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    "/".to_string()
}

#[async_trait]
impl ExecutionEngine for GlobEngine {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g., **/*.rs, *.md)"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern relative to path; use ** to recurse"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search from (default /)"
                }
            },
            "required": ["pattern"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.glob")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: GlobParams = match parse_params(params) {
            Ok(v) => v,
            Err(result) => return Ok(result),
        };
        let path = match self.ctx.validate(&p.path) {
            Ok(path) => path,
            Err(e) => return storage_failure(e),
        };

        let backend = self.ctx.backend()?;
        let entries = backend.search_glob(&p.pattern, &path).await?;
        let paths = entries.into_iter().map(|e| e.path).collect();
        Ok(ExecResult::success(path_listing(paths)))
    }

    async fn is_available(&self) -> bool {
        true
    }
}
