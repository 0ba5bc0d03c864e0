//! Namespaced key/value stores for the persistent backend.
//!
//! A namespace is a short tuple of labels (`["filesystem"]`, or
//! `[agent_id, "filesystem"]` to keep agents sharing one store apart).
//! Values are JSON documents. Stores make no promise about prefix queries;
//! [`KeyValueStore::search`] only pages through one namespace in key order.

use async_trait::async_trait;

use crate::error::StorageResult;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A stored key with its JSON value.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
    pub key: String,
    pub value: serde_json::Value,
}

impl StoreItem {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Async namespaced key/value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a single item.
    async fn get(&self, namespace: &[String], key: &str) -> StorageResult<Option<StoreItem>>;

    /// Insert or overwrite an item.
    async fn put(
        &self,
        namespace: &[String],
        key: &str,
        value: serde_json::Value,
    ) -> StorageResult<()>;

    /// Remove an item. Missing keys are not an error.
    async fn delete(&self, namespace: &[String], key: &str) -> StorageResult<()>;

    /// One page of a namespace, ordered by key.
    async fn search(
        &self,
        namespace: &[String],
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<StoreItem>>;
}

/// Namespace label for file storage.
pub const FILESYSTEM_NAMESPACE: &str = "filesystem";

/// Namespace for file records, optionally partitioned by agent.
pub fn filesystem_namespace(agent_id: Option<&str>) -> Vec<String> {
    match agent_id {
        Some(id) => vec![id.to_string(), FILESYSTEM_NAMESPACE.to_string()],
        None => vec![FILESYSTEM_NAMESPACE.to_string()],
    }
}
