//! Eviction of oversized tool results into backend storage.
//!
//! Results of tools other than the file tools are measured after the tool
//! runs. Anything longer than `4 * token_limit` characters is written to
//! `/large_tool_results/{call id}` through the resolved backend and replaced
//! by a pointer message with a short preview. If that write fails the
//! original result passes through untouched.

use std::future::Future;

use serde::{Deserialize, Serialize};

use kura_types::FileUpdate;

use crate::backend::StorageBackend;
use crate::config::EvictionConfig;
use crate::context::{BackendSource, CallContext};
use crate::format::{self, TOOL_RESULT_TOKEN_LIMIT};
use crate::path::sanitize_tool_call_id;

/// Directory holding evicted results.
pub const LARGE_RESULTS_DIR: &str = "/large_tool_results";

/// Tools whose results are never evicted.
pub const FILESYSTEM_TOOL_NAMES: [&str; 7] = [
    "ls",
    "read_file",
    "write_file",
    "edit_file",
    "glob",
    "grep",
    "execute",
];

const PREVIEW_LINES: usize = 10;
const PREVIEW_LINE_CHARS: usize = 1000;

/// Content of a tool message: plain text or structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolContent {
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

impl ToolContent {
    /// Flatten to one string. A lone text block yields just its text.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => match blocks.as_slice() {
                [single] if single.get("type").and_then(|t| t.as_str()) == Some("text") => {
                    match single.get("text") {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => serde_json::Value::Array(blocks.clone()).to_string(),
                    }
                }
                _ => serde_json::Value::Array(blocks.clone()).to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub tool_call_id: String,
    pub content: ToolContent,
}

impl ToolMessage {
    pub fn text(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: ToolContent::Text(content.into()),
        }
    }
}

/// A message inside a command update. Only tool messages are inspected.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateMessage {
    Tool(ToolMessage),
    Other(serde_json::Value),
}

/// A state update returned by a tool: messages plus file changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandUpdate {
    pub messages: Vec<UpdateMessage>,
    pub files: FileUpdate,
    /// Other state keys, carried through untouched.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// What a tool produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Message(ToolMessage),
    Command(CommandUpdate),
}

/// Rewrites oversized tool results into stored files.
#[derive(Debug, Clone)]
pub struct EvictionInterceptor {
    token_limit: Option<usize>,
    source: BackendSource,
}

impl EvictionInterceptor {
    pub fn new(source: BackendSource) -> Self {
        Self {
            token_limit: Some(TOOL_RESULT_TOKEN_LIMIT),
            source,
        }
    }

    pub fn from_config(config: &EvictionConfig, source: BackendSource) -> Self {
        Self::new(source).with_token_limit(config.token_limit)
    }

    /// `None` or zero disables eviction.
    pub fn with_token_limit(mut self, limit: Option<usize>) -> Self {
        self.token_limit = limit.filter(|l| *l > 0);
        self
    }

    pub fn token_limit(&self) -> Option<usize> {
        self.token_limit
    }

    /// Whether results of `tool_name` are subject to eviction.
    pub fn applies_to(&self, tool_name: &str) -> bool {
        self.token_limit.is_some() && !FILESYSTEM_TOOL_NAMES.contains(&tool_name)
    }

    /// Run a tool and intercept its outcome.
    pub async fn wrap<F, Fut>(&self, tool_name: &str, ctx: &CallContext, run: F) -> ToolOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ToolOutcome>,
    {
        let outcome = run().await;
        if !self.applies_to(tool_name) {
            return outcome;
        }
        self.intercept(outcome, ctx).await
    }

    /// Evict any oversized tool messages in `outcome`.
    pub async fn intercept(&self, outcome: ToolOutcome, ctx: &CallContext) -> ToolOutcome {
        let Some(limit) = self.token_limit else {
            return outcome;
        };

        let backend = match self.source.resolve(ctx) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(error = %e, "cannot resolve backend for eviction, passing result through");
                return outcome;
            }
        };

        match outcome {
            ToolOutcome::Message(message) => {
                match evict_message(message, limit, backend.as_ref()).await {
                    (message, Some(files)) => ToolOutcome::Command(CommandUpdate {
                        messages: vec![UpdateMessage::Tool(message)],
                        files,
                        extra: serde_json::Map::new(),
                    }),
                    (message, None) => ToolOutcome::Message(message),
                }
            }
            ToolOutcome::Command(command) => {
                let CommandUpdate {
                    messages,
                    mut files,
                    extra,
                } = command;
                let mut processed = Vec::with_capacity(messages.len());
                for message in messages {
                    match message {
                        UpdateMessage::Tool(tool) => {
                            let (tool, update) = evict_message(tool, limit, backend.as_ref()).await;
                            if let Some(update) = update {
                                files.merge(update);
                            }
                            processed.push(UpdateMessage::Tool(tool));
                        }
                        other => processed.push(other),
                    }
                }
                ToolOutcome::Command(CommandUpdate {
                    messages: processed,
                    files,
                    extra,
                })
            }
        }
    }
}

/// Evict one message if it is over the threshold.
///
/// Returns the (possibly replaced) message and the write's file update, if
/// the backend produced one.
async fn evict_message(
    message: ToolMessage,
    token_limit: usize,
    backend: &dyn StorageBackend,
) -> (ToolMessage, Option<FileUpdate>) {
    let content = message.content.to_text();
    if content.chars().count() <= 4 * token_limit {
        return (message, None);
    }

    let path = format!(
        "{}/{}",
        LARGE_RESULTS_DIR,
        sanitize_tool_call_id(&message.tool_call_id)
    );
    let result = match backend.write(&path, &content).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "eviction write failed, passing result through");
            return (message, None);
        }
    };
    if let Some(error) = &result.error {
        tracing::warn!(path = %path, error = %error, "eviction write rejected, passing result through");
        return (message, None);
    }

    tracing::debug!(path = %path, chars = content.len(), "evicted tool result");
    let replacement = ToolMessage::text(
        message.tool_call_id.clone(),
        too_large_message(&message.tool_call_id, &path, &preview(&content)),
    );
    (replacement, result.update.filter(|u| !u.is_empty()))
}

/// First lines of `content`, each cut short, line-numbered.
fn preview(content: &str) -> String {
    let lines: Vec<String> = content
        .lines()
        .take(PREVIEW_LINES)
        .map(|line| line.chars().take(PREVIEW_LINE_CHARS).collect())
        .collect();
    format::format_with_line_numbers(&lines, 1)
}

fn too_large_message(tool_call_id: &str, path: &str, sample: &str) -> String {
    format!(
        "Tool result too large, the result of this tool call {tool_call_id} was saved in the filesystem at this path: {path}\n\
You can read the result from the filesystem by using the read_file tool, but make sure to only read part of the result at a time.\n\
You can do this by specifying an offset and limit in the read_file tool call.\n\
For example, to read the first 100 lines, you can use the read_file tool with offset=0 and limit=100.\n\
\n\
Here are the first 10 lines of the result:\n\
{sample}\n"
    )
}
