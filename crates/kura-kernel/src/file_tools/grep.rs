//! GrepEngine: literal text search with three output modes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use kura_types::SearchMatch;

use crate::format::truncate_if_too_long;
use crate::tools::{ExecResult, ExecutionEngine};

use super::{FileToolContext, parse_params, storage_failure};

/// How grep results are rendered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputMode {
    /// Sorted unique paths.
    #[default]
    FilesWithMatches,
    /// `path:` header, then `  line: text` rows.
    Content,
    /// `path: n` per file.
    Count,
}

/// Render matches; "No matches found" when there are none.
pub fn format_grep_matches(matches: &[SearchMatch], mode: OutputMode) -> String {
    if matches.is_empty() {
        return "No matches found".to_string();
    }

    let mut by_path: BTreeMap<&str, Vec<&SearchMatch>> = BTreeMap::new();
    for m in matches {
        by_path.entry(m.path.as_str()).or_default().push(m);
    }

    match mode {
        OutputMode::FilesWithMatches => by_path.keys().copied().collect::<Vec<_>>().join("\n"),
        OutputMode::Count => by_path
            .iter()
            .map(|(path, hits)| format!("{}: {}", path, hits.len()))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputMode::Content => {
            let mut lines = Vec::new();
            for (path, hits) in &by_path {
                lines.push(format!("{}:", path));
                for hit in hits {
                    lines.push(format!("  {}: {}", hit.line, hit.text));
                }
            }
            lines.join("\n")
        }
    }
}

pub struct GrepEngine {
    ctx: Arc<FileToolContext>,
}

impl GrepEngine {
    pub fn new(ctx: Arc<FileToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GrepParams {
    pattern: String,
    path: Option<String>,
    glob: Option<String>,
    #[serde(default)]
    output_mode: OutputMode,
}

#[async_trait]
impl ExecutionEngine for GrepEngine {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a literal string"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Literal text to search for (not a regex)"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search. Omit to search everywhere."
                },
                "glob": {
                    "type": "string",
                    "description": "Only search files whose name matches (e.g., *.py)"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["files_with_matches", "content", "count"],
                    "description": "Result format (default files_with_matches)"
                }
            },
            "required": ["pattern"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.grep")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: GrepParams = match parse_params(params) {
            Ok(v) => v,
            Err(result) => return Ok(result),
        };
        let path = match p.path.as_deref().map(|path| self.ctx.validate(path)).transpose() {
            Ok(path) => path,
            Err(e) => return storage_failure(e),
        };

        let backend = self.ctx.backend()?;
        let matches = match backend
            .search_text(&p.pattern, path.as_deref(), p.glob.as_deref())
            .await?
        {
            Ok(matches) => matches,
            Err(message) => return Ok(ExecResult::failure(1, message)),
        };
        let formatted = format_grep_matches(&matches, p.output_mode);
        Ok(ExecResult::success(truncate_if_too_long(&formatted)))
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

    fn sample() -> Vec<SearchMatch> {
        vec![
            SearchMatch::new("/b.py", 3, "import os"),
            SearchMatch::new("/a.py", 1, "import sys"),
            SearchMatch::new("/a.py", 7, "import os"),
        ]
    }

    #[test]
    fn test_output_modes() {
        let m = sample();
        assert_eq!(
            format_grep_matches(&m, OutputMode::FilesWithMatches),
            "/a.py\n/b.py"
        );
        assert_eq!(format_grep_matches(&m, OutputMode::Count), "/a.py: 2\n/b.py: 1");
        assert_eq!(
            format_grep_matches(&m, OutputMode::Content),
            "/a.py:\n  1: import sys\n  7: import os\n/b.py:\n  3: import os"
        );
        assert_eq!(
            format_grep_matches(&[], OutputMode::Content),
            "No matches found"
        );
        assert_eq!("count".parse::<OutputMode>().unwrap(), OutputMode::Count);
    }

    #[tokio::test]
    async fn test_grep_is_literal_and_scoped() {
        let ctx = ephemeral_ctx();
        let write = WriteFileEngine::new(ctx.clone());
        for (path, content) in [
            ("/src/main.py", "x = foo(1)\nprint(x)"),
            ("/docs/readme.md", "call foo(1) first"),
        ] {
            write
                .execute(&params(json!({"file_path": path, "content": content})))
                .await
                .unwrap();
        }
        let grep = GrepEngine::new(ctx);

        let all = grep
            .execute(&params(json!({"pattern": "foo(1)"})))
            .await
            .unwrap();
        assert_eq!(all.stdout, "/docs/readme.md\n/src/main.py");

        let scoped = grep
            .execute(&params(json!({"pattern": "foo(1)", "path": "/src", "output_mode": "content"})))
            .await
            .unwrap();
        assert_eq!(scoped.stdout, "/src/main.py:\n  1: x = foo(1)");

        let filtered = grep
            .execute(&params(json!({"pattern": "foo", "glob": "*.md", "output_mode": "count"})))
            .await
            .unwrap();
        assert_eq!(filtered.stdout, "/docs/readme.md: 1");

        let bad_glob = grep
            .execute(&params(json!({"pattern": "foo", "glob": "[unclosed"})))
            .await
            .unwrap();
        assert!(!bad_glob.success);
        assert!(bad_glob.stderr.contains("Invalid glob pattern"));
    }
}
