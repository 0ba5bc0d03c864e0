//! SQLite-backed key/value store.
//!
//! One table keyed by (namespace, key). The namespace tuple is stored as its
//! JSON array encoding so labels may contain any character. Calls run on
//! the blocking pool; the connection is guarded by a mutex.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use super::{KeyValueStore, StoreItem};
use crate::backend::offload;
use crate::error::{StorageError, StorageResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER DEFAULT (unixepoch()),
    PRIMARY KEY (namespace, key)
);
"#;

/// Key/value store persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

fn encode_namespace(namespace: &[String]) -> StorageResult<String> {
    Ok(serde_json::to_string(namespace)?)
}

fn decode_value(key: String, raw: String) -> StorageResult<StoreItem> {
    let value = serde_json::from_str(&raw)
        .map_err(|e| StorageError::store(format!("corrupt value for {}: {}", key, e)))?;
    Ok(StoreItem::new(key, value))
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, namespace: &[String], key: &str) -> StorageResult<Option<StoreItem>> {
        let conn = Arc::clone(&self.conn);
        let ns = encode_namespace(namespace)?;
        let key = key.to_owned();
        offload(move || {
            let raw: Option<String> = conn
                .lock()
                .query_row(
                    "SELECT value FROM items WHERE namespace = ?1 AND key = ?2",
                    params![ns, key],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|raw| decode_value(key, raw)).transpose()
        })
        .await
    }

    async fn put(
        &self,
        namespace: &[String],
        key: &str,
        value: serde_json::Value,
    ) -> StorageResult<()> {
        let conn = Arc::clone(&self.conn);
        let ns = encode_namespace(namespace)?;
        let key = key.to_owned();
        let raw = serde_json::to_string(&value)?;
        offload(move || {
            conn.lock().execute(
                "INSERT INTO items (namespace, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = unixepoch()",
                params![ns, key, raw],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, namespace: &[String], key: &str) -> StorageResult<()> {
        let conn = Arc::clone(&self.conn);
        let ns = encode_namespace(namespace)?;
        let key = key.to_owned();
        offload(move || {
            conn.lock().execute(
                "DELETE FROM items WHERE namespace = ?1 AND key = ?2",
                params![ns, key],
            )?;
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        namespace: &[String],
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<StoreItem>> {
        let conn = Arc::clone(&self.conn);
        let ns = encode_namespace(namespace)?;
        offload(move || {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT key, value FROM items WHERE namespace = ?1 ORDER BY key LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![ns, limit as i64, offset as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut items = Vec::new();
            for row in rows {
                let (key, raw) = row?;
                items.push(decode_value(key, raw)?);
            }
            Ok(items)
        })
        .await
    }
}
