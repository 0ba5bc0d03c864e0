//! In-process key/value store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KeyValueStore, StoreItem};
use crate::error::StorageResult;

/// Key/value store held in memory, one ordered map per namespace.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespaces: DashMap<Vec<String>, BTreeMap<String, serde_json::Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items in a namespace.
    pub fn len(&self, namespace: &[String]) -> usize {
        self.namespaces.get(namespace).map_or(0, |ns| ns.len())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, namespace: &[String], key: &str) -> StorageResult<Option<StoreItem>> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key).map(|v| StoreItem::new(key, v.clone()))))
    }

    async fn put(
        &self,
        namespace: &[String],
        key: &str,
        value: serde_json::Value,
    ) -> StorageResult<()> {
        self.namespaces
            .entry(namespace.to_vec())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &[String], key: &str) -> StorageResult<()> {
        if let Some(mut ns) = self.namespaces.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn search(
        &self,
        namespace: &[String],
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<StoreItem>> {
        Ok(self
            .namespaces
            .get(namespace)
            .map(|ns| {
                ns.iter()
                    .skip(offset)
                    .take(limit)
                    .map(|(k, v)| StoreItem::new(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
