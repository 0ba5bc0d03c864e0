//! Tool registry and execution engines.
//!
//! Tools take JSON parameters and produce an [`ExecResult`]. The registry
//! turns results into tool messages and, when configured, routes them
//! through the [`EvictionInterceptor`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::eviction::{EvictionInterceptor, ToolMessage, ToolOutcome};

/// Information about a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Tool category (e.g., "filesystem", "shell").
    pub category: String,
}

impl ToolInfo {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Result of running a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
    pub success: bool,
}

impl ExecResult {
    /// Create a successful result.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
        }
    }

    /// Create a result with both stdout and stderr.
    pub fn with_output(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            success: exit_code == 0,
        }
    }

    /// The text an agent sees: stdout, stderr, or both.
    pub fn output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Trait for execution engines.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Get the engine name.
    fn name(&self) -> &str;

    /// Get the engine description.
    fn description(&self) -> &str;

    /// Execute with JSON parameters.
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult>;

    /// Check if this engine is available/ready.
    async fn is_available(&self) -> bool;

    /// JSON Schema for the parameters.
    fn schema(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Registry of tools and execution engines.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolInfo>,
    engines: HashMap<String, Arc<dyn ExecutionEngine>>,
    eviction: Option<(EvictionInterceptor, CallContext)>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools)
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .field("eviction", &self.eviction.as_ref().map(|(i, _)| i.token_limit()))
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route results of [`call`](Self::call) through an interceptor.
    pub fn with_eviction(mut self, interceptor: EvictionInterceptor, ctx: CallContext) -> Self {
        self.eviction = Some((interceptor, ctx));
        self
    }

    /// Register a tool with an execution engine.
    pub fn register_with_engine(&mut self, info: ToolInfo, engine: Arc<dyn ExecutionEngine>) {
        let name = info.name.clone();
        self.tools.insert(name.clone(), info);
        self.engines.insert(name, engine);
    }

    /// Remove a tool and its engine.
    pub fn remove(&mut self, name: &str) -> bool {
        self.engines.remove(name);
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ToolInfo> {
        self.tools.get(name)
    }

    pub fn get_engine(&self, name: &str) -> Option<Arc<dyn ExecutionEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn has_engine(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// All tools, sorted by name.
    pub fn list(&self) -> Vec<&ToolInfo> {
        let mut tools: Vec<&ToolInfo> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Run a tool by name.
    pub async fn execute(&self, name: &str, params: &str) -> anyhow::Result<ExecResult> {
        match self.get_engine(name) {
            Some(engine) => engine.execute(params).await,
            None => Ok(ExecResult::failure(1, format!("Unknown tool: {}", name))),
        }
    }

    /// Run a tool and package its result as a tool message, evicting it to
    /// storage if it is oversized.
    ///
    /// A file update produced by eviction is applied to the context's
    /// ephemeral state before the outcome is returned.
    pub async fn call(
        &self,
        name: &str,
        tool_call_id: &str,
        params: &str,
    ) -> anyhow::Result<ToolOutcome> {
        let result = self.execute(name, params).await?;
        Ok(self.package(name, tool_call_id, &result).await)
    }

    /// Package an existing result as [`call`](Self::call) would.
    pub async fn package(&self, name: &str, tool_call_id: &str, result: &ExecResult) -> ToolOutcome {
        let message = ToolOutcome::Message(ToolMessage::text(tool_call_id, result.output()));

        let Some((interceptor, ctx)) = &self.eviction else {
            return message;
        };
        let outcome = interceptor.wrap(name, ctx, move || async move { message }).await;
        if let ToolOutcome::Command(command) = &outcome {
            ctx.state.apply(&command.files);
        }
        outcome
    }
}
