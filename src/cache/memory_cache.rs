use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::cache::{Cache, CacheEntry, CacheError};
use crate::helpers::time::{Clock, SystemClock};

/// Process-local cache. Clones share the same storage, so several token
/// managers can hand one instance around.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        {
            let map = self.inner.read().await;
            match map.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        // re-check under the write lock, a concurrent set may have refreshed it
        let mut map = self.inner.write().await;
        if map.get(key).is_some_and(|entry| entry.is_expired(now)) {
            map.remove(key);
        }
        Ok(map
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, payload: Value, ttl_seconds: u64) -> Result<(), CacheError> {
        let entry = CacheEntry::new(payload, self.clock.now(), ttl_seconds);
        self.inner.write().await.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::common::ManualClock;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_returns_payload() {
        let cache = MemoryCache::default();
        cache.set("k", json!({"a": 1}), 30).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_is_removed() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = MemoryCache::new(clock.clone());
        cache.set("k", json!("v"), 10).await.unwrap();

        clock.advance(10);
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
        // second read needs no cleanup
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let cache = MemoryCache::default();
        let other = cache.clone();
        cache.set("shared", json!(true), 60).await.unwrap();
        assert_eq!(other.get("shared").await.unwrap(), Some(json!(true)));
        other.delete("shared").await.unwrap();
        other.delete("shared").await.unwrap();
        assert_eq!(cache.get("shared").await.unwrap(), None);
    }
}
