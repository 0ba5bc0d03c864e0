//! kura: run one file operation against configured storage backends.
//!
//! Usage:
//!   kura --config kura.toml ls /memories/
//!   kura --config kura.toml read /workspace/src/main.rs --offset 100 --limit 50
//!   echo "hello" | kura --config kura.toml write /memories/hello.md
//!   kura --config kura.toml grep TODO --path /workspace/ --mode content
//!   kura --config kura.toml exec "cargo --version"
//!
//! Without `--config`, every path lives in ephemeral memory for the duration
//! of the process. Logging goes to stderr; set `RUST_LOG=debug` to see
//! routing decisions.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kura_kernel::eviction::UpdateMessage;
use kura_kernel::file_tools::OutputMode;
use kura_kernel::{
    BackendSource, EvictionInterceptor, FileToolContext, KuraConfig, ToolOutcome, ToolRegistry,
    register_file_tools,
};

/// Path-addressed storage for agents.
#[derive(Parser, Debug)]
#[command(name = "kura")]
#[command(about = "Run file operations against kura storage backends")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Partition persistent storage by this agent id
    #[arg(long)]
    agent_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Read a file with line numbers
    Read {
        path: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = kura_kernel::format::DEFAULT_READ_LIMIT)]
        limit: usize,
    },
    /// Create a new file; content is read from stdin when omitted
    Write { path: String, content: Option<String> },
    /// Replace an exact string in a file
    Edit {
        path: String,
        old: String,
        new: String,
        /// Replace every occurrence
        #[arg(long)]
        all: bool,
    },
    /// Find files by glob pattern
    Glob {
        pattern: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Search file contents for literal text
    Grep {
        pattern: String,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        glob: Option<String>,
        /// files_with_matches, content or count
        #[arg(long, default_value = "files_with_matches")]
        mode: OutputMode,
    },
    /// Run a shell command (requires a shell default backend)
    Exec { command: String },
    /// List available tools
    Tools,
}

impl Command {
    /// Tool name and JSON params for this command.
    fn to_tool_call(&self) -> Result<(&'static str, serde_json::Value)> {
        Ok(match self {
            Command::Ls { path } => ("ls", json!({ "path": path })),
            Command::Read {
                path,
                offset,
                limit,
            } => (
                "read_file",
                json!({ "file_path": path, "offset": offset, "limit": limit }),
            ),
            Command::Write { path, content } => {
                let content = match content {
                    Some(content) => content.clone(),
                    None => std::io::read_to_string(std::io::stdin())
                        .context("reading content from stdin")?,
                };
                ("write_file", json!({ "file_path": path, "content": content }))
            }
            Command::Edit {
                path,
                old,
                new,
                all,
            } => (
                "edit_file",
                json!({
                    "file_path": path,
                    "old_string": old,
                    "new_string": new,
                    "replace_all": all,
                }),
            ),
            Command::Glob { pattern, path } => {
                ("glob", json!({ "pattern": pattern, "path": path }))
            }
            Command::Grep {
                pattern,
                path,
                glob,
                mode,
            } => (
                "grep",
                json!({
                    "pattern": pattern,
                    "path": path,
                    "glob": glob,
                    "output_mode": mode,
                }),
            ),
            Command::Exec { command } => ("execute", json!({ "command": command })),
            Command::Tools => anyhow::bail!("tools is not a tool call"),
        })
    }
}

fn load_config(args: &Args) -> Result<KuraConfig> {
    let config = match &args.config {
        Some(path) => KuraConfig::load(path)?,
        None => KuraConfig::default(),
    };
    Ok(match &args.agent_id {
        Some(agent_id) => config.with_agent_id(agent_id.clone()),
        None => config,
    })
}

fn print_outcome(outcome: &ToolOutcome) {
    match outcome {
        ToolOutcome::Message(message) => println!("{}", message.content.to_text()),
        ToolOutcome::Command(command) => {
            for message in &command.messages {
                if let UpdateMessage::Tool(tool) = message {
                    println!("{}", tool.content.to_text());
                }
            }
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let built = config.build()?;
    tracing::debug!(context = ?built.context, "backend ready");

    let source = BackendSource::Instance(built.backend.clone());
    let interceptor = EvictionInterceptor::from_config(&config.eviction, source.clone());
    let mut registry = ToolRegistry::new().with_eviction(interceptor, built.context.clone());
    let tools = FileToolContext::new(source, built.context)
        .with_allowed_prefixes(config.allowed_prefixes.clone());
    register_file_tools(&mut registry, Arc::new(tools));

    if let Command::Tools = args.command {
        for tool in registry.list() {
            println!("{:<12} {:<12} {}", tool.name, tool.category, tool.description);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let (tool, params) = args.command.to_tool_call()?;
    let result = registry.execute(tool, &params.to_string()).await?;
    if !result.success {
        eprintln!("{}", result.output());
        return Ok(ExitCode::from(u8::try_from(result.exit_code).unwrap_or(1)));
    }
    print_outcome(&registry.package(tool, "cli", &result).await);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
