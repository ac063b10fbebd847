//! In-memory cache implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{CacheError, CacheStore, Result};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct InMemoryCacheState {
    entries: HashMap<String, CacheEntry>,
    delete_count: u64,
    fail_on_delete: bool,
}

/// In-memory cache with per-entry expiry.
///
/// Serves as the process-local cache in deployments without a cache
/// backend, and as the test double for the checkout core's invalidation
/// step (with a failure-injection knob and a delete counter).
#[derive(Clone, Default)]
pub struct InMemoryCache {
    state: Arc<RwLock<InMemoryCacheState>>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures delete calls to fail until reset.
    pub async fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().await.fail_on_delete = fail;
    }

    /// Returns how many delete calls have been attempted.
    pub async fn delete_count(&self) -> u64 {
        self.state.read().await.delete_count
    }

    /// Returns true if a live entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.ok().flatten().is_some()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.delete_count += 1;
        if state.fail_on_delete {
            return Err(CacheError::Backend("injected delete failure".to_string()));
        }
        state.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let cache = InMemoryCache::new();
        cache
            .set("product:1", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.get("product:1").await.unwrap(),
            Some("{}".to_string())
        );

        cache.delete("product:1").await.unwrap();
        assert_eq!(cache.get("product:1").await.unwrap(), None);
        assert_eq!(cache.delete_count().await, 1);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = InMemoryCache::new();
        cache
            .set("product:1", "{}", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("product:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_delete_failure_leaves_entry() {
        let cache = InMemoryCache::new();
        cache
            .set("product:1", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        cache.set_fail_on_delete(true).await;

        assert!(cache.delete("product:1").await.is_err());
        assert!(cache.contains("product:1").await);

        cache.set_fail_on_delete(false).await;
        cache.delete("product:1").await.unwrap();
        assert!(!cache.contains("product:1").await);
    }

    #[tokio::test]
    async fn deleting_absent_key_is_ok() {
        let cache = InMemoryCache::new();
        cache.delete("product:missing").await.unwrap();
    }
}
