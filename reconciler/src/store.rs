//! The store adapter publishes the flattened state to the shared key-value store
//! the relay proxy reads from.
use crate::config::{StoreType, redact_url};
use crate::types::EntrySet;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Bulk operations on the shared store. Empty inputs must be no-ops.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn upsert(&self, entries: &EntrySet) -> Result<(), StoreError>;
    async fn delete_keys(&self, keys: &BTreeSet<String>) -> Result<(), StoreError>;
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

pub async fn get_store(store_type: StoreType) -> Result<Arc<dyn StoreAdapter>, StoreError> {
    match store_type {
        StoreType::Redis { url } => Ok(Arc::new(RedisStore::connect(&url).await?)),
        StoreType::Memory => {
            tracing::warn!("Using the in-memory store, nothing is published to the relay");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection_manager().await?;

        let reply = redis::cmd("PING").query_async::<String>(&mut conn).await?;
        if reply != "PONG" {
            return Err(StoreError::Unavailable(format!(
                "unexpected reply to PING: {reply}"
            )));
        }
        tracing::info!(url = %redact_url(url), "Connected to redis");

        Ok(RedisStore { conn })
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    async fn upsert(&self, entries: &EntrySet) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn delete_keys(&self, keys: &BTreeSet<String>) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(keys.iter().collect::<Vec<_>>())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys = redis::cmd("KEYS")
            .arg(format!("{prefix}*"))
            .query_async::<Vec<String>>(&mut conn)
            .await?;
        keys.sort();
        Ok(keys)
    }
}

/// In-process store. Useful for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<EntrySet>,
}

impl MemoryStore {
    pub fn snapshot(&self) -> EntrySet {
        self.data.lock().clone()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.data.lock().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn upsert(&self, entries: &EntrySet) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete_keys(&self, keys: &BTreeSet<String>) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::default();

        let entries = EntrySet::from([
            ("traefik/http/routers/a/rule".to_string(), "Host(`a`)".to_string()),
            ("traefik/http/routers/b/rule".to_string(), "Host(`b`)".to_string()),
        ]);
        store.upsert(&entries).await.unwrap();
        store.insert("other/key", "x");

        assert_eq!(
            store.keys("traefik/").await.unwrap(),
            vec![
                "traefik/http/routers/a/rule".to_string(),
                "traefik/http/routers/b/rule".to_string()
            ]
        );

        store
            .delete_keys(&BTreeSet::from(["traefik/http/routers/a/rule".to_string()]))
            .await
            .unwrap();
        store.upsert(&EntrySet::new()).await.unwrap();
        store.delete_keys(&BTreeSet::new()).await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key("other/key"));
        assert!(snapshot.contains_key("traefik/http/routers/b/rule"));
    }

    #[tokio::test]
    async fn test_invalid_redis_url() {
        let result = get_store(StoreType::Redis {
            url: "not-a-redis-url".into(),
        })
        .await;
        assert!(matches!(result, Err(StoreError::Redis(_))));
    }
}
