//! ExecuteEngine: run a shell command when the backend is a sandbox.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use kura_types::ExecuteResponse;

use crate::tools::{ExecResult, ExecutionEngine};

use super::{FileToolContext, parse_params};

const NOT_AVAILABLE: &str = "Error: Execution not available. This agent's backend does not support command execution (Sandbox). To use the execute tool, provide a backend that implements Sandbox.";

pub struct ExecuteEngine {
    ctx: Arc<FileToolContext>,
}

impl ExecuteEngine {
    pub fn new(ctx: Arc<FileToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct ExecuteParams {
    command: String,
}

/// Output followed by a status line and, if cut short, a truncation note.
pub(crate) fn format_execute_response(response: &ExecuteResponse) -> String {
    let mut text = response.output.clone();
    match response.exit_code {
        Some(0) => text.push_str("\n[Command succeeded with exit code 0]"),
        Some(code) => text.push_str(&format!("\n[Command failed with exit code {}]", code)),
        None => {}
    }
    if response.truncated {
        text.push_str("\n[Output was truncated due to size limits]");
    }
    text
}

#[async_trait]
impl ExecutionEngine for ExecuteEngine {
    fn name(&self) -> &str {
        "execute"
    }

    fn description(&self) -> &str {
        "Run a shell command in the sandbox and return its combined output"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to run"
                }
            },
            "required": ["command"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.execute")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: ExecuteParams = match parse_params(params) {
            Ok(v) => v,
            Err(result) => return Ok(result),
        };

        let backend = self.ctx.backend()?;
        let Some(sandbox) = backend.as_sandbox() else {
            return Ok(ExecResult::failure(1, NOT_AVAILABLE));
        };

        tracing::debug!(sandbox = sandbox.id(), "executing command");
        let response = sandbox.execute(&p.command).await?;
        let text = format_execute_response(&response);
        Ok(ExecResult::with_output(
            text,
            "",
            response.exit_code.unwrap_or(-1),
        ))
    }

    async fn is_available(&self) -> bool {
        self.ctx
            .backend()
            .map(|backend| backend.as_sandbox().is_some())
            .unwrap_or(false)
    }
}
