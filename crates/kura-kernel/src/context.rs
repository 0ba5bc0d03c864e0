//! Per-call context and backend selection.
//!
//! A backend is either a ready instance or a factory invoked with the
//! [`CallContext`] of each operation. Factories let one configuration serve
//! many conversations: the ephemeral backend binds to the conversation's
//! state, the persistent backend to the caller's agent id.

use std::sync::Arc;

use crate::backend::StorageBackend;
use crate::backends::{EphemeralBackend, EphemeralState, PersistentBackend};
use crate::error::{StorageError, StorageResult};
use crate::store::KeyValueStore;

/// What a backend factory can see about the current call.
#[derive(Clone, Default)]
pub struct CallContext {
    /// The conversation's ephemeral file map.
    pub state: EphemeralState,
    pub store: Option<Arc<dyn KeyValueStore>>,
    pub agent_id: Option<String>,
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("files", &self.state.len())
            .field("store", &self.store.is_some())
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

impl CallContext {
    pub fn new(state: EphemeralState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// Builds a backend for one call.
pub type BackendFactory =
    Arc<dyn Fn(&CallContext) -> StorageResult<Arc<dyn StorageBackend>> + Send + Sync>;

/// A backend instance, or a factory resolved once per operation.
#[derive(Clone)]
pub enum BackendSource {
    Instance(Arc<dyn StorageBackend>),
    Factory(BackendFactory),
}

impl std::fmt::Debug for BackendSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance(b) => f.debug_tuple("Instance").field(&b.name()).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl BackendSource {
    pub fn instance(backend: impl StorageBackend + 'static) -> Self {
        Self::Instance(Arc::new(backend))
    }

    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&CallContext) -> StorageResult<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// Ephemeral backend over the caller's state.
    pub fn ephemeral() -> Self {
        Self::factory(|ctx| {
            let backend: Arc<dyn StorageBackend> = Arc::new(EphemeralBackend::new(ctx.state.clone()));
            Ok(backend)
        })
    }

    /// Persistent backend over the caller's store, partitioned by agent id.
    pub fn persistent() -> Self {
        Self::factory(|ctx| {
            let store = ctx.store.clone().ok_or(StorageError::Unsupported(
                "persistent backend requires a store in the call context",
            ))?;
            let backend: Arc<dyn StorageBackend> =
                Arc::new(PersistentBackend::new(store).with_agent_id(ctx.agent_id.as_deref()));
            Ok(backend)
        })
    }

    pub fn resolve(&self, ctx: &CallContext) -> StorageResult<Arc<dyn StorageBackend>> {
        match self {
            Self::Instance(backend) => Ok(Arc::clone(backend)),
            Self::Factory(factory) => factory(ctx),
        }
    }
}

impl From<Arc<dyn StorageBackend>> for BackendSource {
    fn from(backend: Arc<dyn StorageBackend>) -> Self {
        Self::Instance(backend)
    }
}
