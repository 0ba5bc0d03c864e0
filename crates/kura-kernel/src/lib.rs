//! # kura-kernel
//!
//! Path-addressed file storage for agents.
//!
//! An agent reads, writes, edits, lists and searches `/`-rooted virtual
//! paths without knowing where each one lives. Four backends implement one
//! contract:
//! - Ephemeral, per-conversation memory
//! - A persistent key/value store, optionally partitioned per agent
//! - The local filesystem, optionally confined under a root
//! - A remote sandbox reached only through shell commands
//!
//! The [`CompositeBackend`] routes by longest path prefix, and the
//! [`EvictionInterceptor`] moves oversized tool results into storage.

pub mod backend;
pub mod backends;
pub mod blocking;
pub mod config;
pub mod context;
pub mod error;
pub mod eviction;
pub mod file_tools;
pub mod format;
pub mod glob;
pub mod path;
pub mod router;
pub mod store;
pub mod tools;

pub use backend::{Sandbox, StorageBackend, TextSearch};
pub use backends::{
    EphemeralBackend, EphemeralState, LocalDiskBackend, LocalShell, PersistentBackend,
    RemoteShell, ShellBackend,
};
pub use blocking::BlockingBackend;
pub use config::{BackendKind, BuiltBackend, KuraConfig};
pub use context::{BackendFactory, BackendSource, CallContext};
pub use error::{StorageError, StorageResult};
pub use eviction::{EvictionInterceptor, ToolContent, ToolMessage, ToolOutcome};
pub use file_tools::{FileToolContext, register_file_tools};
pub use path::{sanitize_tool_call_id, validate_path};
pub use router::{CompositeBackend, UpdateHook};
pub use store::{InMemoryStore, KeyValueStore, SqliteStore};
pub use tools::{ExecResult, ExecutionEngine, ToolInfo, ToolRegistry};

pub use kura_types::{
    DownloadResponse, ExecuteResponse, FileOperationError, FileRecord, FileUpdate, ListEntry,
    OperationResult, SearchMatch, UploadResponse,
};
