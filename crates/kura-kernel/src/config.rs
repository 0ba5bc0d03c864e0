//! Configuration, loaded once from TOML and threaded through constructors.
//!
//! Every section has defaults, so a partial file (or none at all) works:
//!
//! ```toml
//! default_backend = "ephemeral"
//! allowed_prefixes = ["/"]
//!
//! [routes]
//! "/memories/" = "persistent"
//! "/workspace/" = "local"
//!
//! [local]
//! root = "/srv/project"
//! virtual_mode = true
//!
//! [persistent]
//! path = "kura.db"
//! agent_id = "researcher"
//!
//! [eviction]
//! token_limit = 20000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::backend::StorageBackend;
use crate::backends::{
    EphemeralBackend, EphemeralState, LocalDiskBackend, LocalShell, PersistentBackend,
    ShellBackend,
};
use crate::context::CallContext;
use crate::router::CompositeBackend;
use crate::store::{InMemoryStore, KeyValueStore, SqliteStore};

/// Which backend serves a route.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Ephemeral,
    Persistent,
    Local,
    Shell,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KuraConfig {
    #[serde(default)]
    pub local: LocalDiskConfig,
    #[serde(default)]
    pub persistent: PersistentConfig,
    #[serde(default)]
    pub eviction: EvictionConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    /// Route prefix → backend.
    #[serde(default)]
    pub routes: BTreeMap<String, BackendKind>,
    #[serde(default)]
    pub default_backend: BackendKind,
    /// When set, tool paths must start with one of these.
    #[serde(default)]
    pub allowed_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDiskConfig {
    /// Defaults to the working directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub virtual_mode: bool,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_true")]
    pub ripgrep: bool,
    #[serde(default = "default_ripgrep_timeout_secs")]
    pub ripgrep_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentConfig {
    /// SQLite database file. Without one, an in-memory store is used.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Zero or absent disables eviction.
    #[serde(default = "default_token_limit")]
    pub token_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_execute_timeout_secs")]
    pub execute_timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_max_file_size_mb() -> u64 {
    10
}

fn default_ripgrep_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    crate::backends::persistent::DEFAULT_PAGE_SIZE
}

fn default_token_limit() -> Option<usize> {
    Some(crate::format::TOOL_RESULT_TOKEN_LIMIT)
}

fn default_execute_timeout_secs() -> u64 {
    30 * 60
}

fn default_max_output_bytes() -> usize {
    100_000
}

impl Default for LocalDiskConfig {
    fn default() -> Self {
        Self {
            root: None,
            virtual_mode: false,
            max_file_size_mb: default_max_file_size_mb(),
            ripgrep: true,
            ripgrep_timeout_secs: default_ripgrep_timeout_secs(),
        }
    }
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            path: None,
            agent_id: None,
            page_size: default_page_size(),
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            token_limit: default_token_limit(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            execute_timeout_secs: default_execute_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            cwd: None,
        }
    }
}

/// A composite backend assembled from configuration, with the context its
/// callers should use.
pub struct BuiltBackend {
    pub backend: Arc<CompositeBackend>,
    pub context: CallContext,
}

impl KuraConfig {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("invalid kura configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn with_route(mut self, prefix: impl Into<String>, kind: BackendKind) -> Self {
        self.routes.insert(prefix.into(), kind);
        self
    }

    pub fn with_default_backend(mut self, kind: BackendKind) -> Self {
        self.default_backend = kind;
        self
    }

    pub fn with_local_root(mut self, root: impl Into<PathBuf>, virtual_mode: bool) -> Self {
        self.local.root = Some(root.into());
        self.local.virtual_mode = virtual_mode;
        self
    }

    pub fn with_sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistent.path = Some(path.into());
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.persistent.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_token_limit(mut self, limit: Option<usize>) -> Self {
        self.eviction.token_limit = limit;
        self
    }

    pub fn with_allowed_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.allowed_prefixes = Some(prefixes);
        self
    }

    fn validate(&self) -> anyhow::Result<()> {
        for prefix in self.routes.keys() {
            if !prefix.starts_with('/') {
                bail!("route prefix must start with '/': {}", prefix);
            }
        }
        if let Some(prefixes) = &self.allowed_prefixes {
            if prefixes.iter().any(|p| !p.starts_with('/')) {
                bail!("allowed_prefixes entries must start with '/'");
            }
        }
        Ok(())
    }

    /// Assemble the composite backend described by this configuration.
    pub fn build(&self) -> anyhow::Result<BuiltBackend> {
        self.validate()?;

        let state = EphemeralState::new();
        let store: Arc<dyn KeyValueStore> = match &self.persistent.path {
            Some(path) => Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("opening store {}", path.display()))?,
            ),
            None => Arc::new(InMemoryStore::new()),
        };

        let make = |kind: BackendKind| -> anyhow::Result<Arc<dyn StorageBackend>> {
            Ok(match kind {
                BackendKind::Ephemeral => Arc::new(EphemeralBackend::new(state.clone())),
                BackendKind::Persistent => Arc::new(
                    PersistentBackend::new(Arc::clone(&store))
                        .with_agent_id(self.persistent.agent_id.as_deref())
                        .with_page_size(self.persistent.page_size),
                ),
                BackendKind::Local => Arc::new(LocalDiskBackend::from_config(&self.local)?),
                BackendKind::Shell => Arc::new(ShellBackend::new(LocalShell::from_config(&self.shell))),
            })
        };

        let mut router = CompositeBackend::new(make(self.default_backend)?)
            .with_update_hook(Arc::new(state.clone()));
        for (prefix, kind) in &self.routes {
            router = router.with_route(prefix, make(*kind)?);
        }
        tracing::debug!(?router, "assembled backend");

        let mut context = CallContext::new(state).with_store(store);
        if let Some(agent_id) = &self.persistent.agent_id {
            context = context.with_agent_id(agent_id.clone());
        }

        Ok(BuiltBackend {
            backend: Arc::new(router),
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = KuraConfig::from_toml("").unwrap();
        assert_eq!(config.default_backend, BackendKind::Ephemeral);
        assert_eq!(config.local.max_file_size_mb, 10);
        assert!(config.local.ripgrep);
        assert_eq!(config.local.ripgrep_timeout_secs, 30);
        assert_eq!(config.persistent.page_size, 100);
        assert_eq!(config.eviction.token_limit, Some(20_000));
        assert_eq!(config.shell.execute_timeout_secs, 1800);
        assert_eq!(config.shell.max_output_bytes, 100_000);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config = KuraConfig::from_toml(
            r#"
            default_backend = "local"

            [routes]
            "/memories/" = "persistent"

            [local]
            virtual_mode = true

            [eviction]
            token_limit = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.default_backend, BackendKind::Local);
        assert_eq!(config.routes["/memories/"], BackendKind::Persistent);
        assert!(config.local.virtual_mode);
        assert_eq!(config.local.max_file_size_mb, 10);
        assert_eq!(config.eviction.token_limit, Some(0));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(KuraConfig::from_toml("default_backend = \"s3\"").is_err());
        assert!(KuraConfig::from_toml("[routes]\n\"memories/\" = \"persistent\"").is_err());
        assert_eq!("shell".parse::<BackendKind>().unwrap(), BackendKind::Shell);
        assert_eq!(BackendKind::Persistent.to_string(), "persistent");
    }

    #[tokio::test]
    async fn test_build_routes_to_configured_backends() {
        let dir = TempDir::new().unwrap();
        let config = KuraConfig::default()
            .with_local_root(dir.path(), true)
            .with_route("/disk/", BackendKind::Local)
            .with_route("/memories/", BackendKind::Persistent)
            .with_sqlite(dir.path().join("kura.db"))
            .with_agent_id("tester");

        let built = config.build().unwrap();
        let backend = built.backend;

        backend.write("/disk/out.txt", "on disk").await.unwrap();
        assert!(dir.path().join("out.txt").exists());

        backend.write("/memories/m.md", "stored").await.unwrap();
        backend.write("/scratch.md", "ephemeral").await.unwrap();
        assert!(built.context.state.contains("/scratch.md"));
        assert_eq!(built.context.agent_id.as_deref(), Some("tester"));

        let root = backend.list("/").await.unwrap();
        let paths: Vec<&str> = root.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/disk/", "/memories/", "/scratch.md"]);
    }
}
