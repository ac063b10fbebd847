//! In-memory lock service for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    ACQUIRE_RETRY_COUNT, ACQUIRE_RETRY_DELAY, LockError, LockHandle, LockService, Result,
};

struct HeldKey {
    token: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct InMemoryLockState {
    held: HashMap<String, HeldKey>,
    acquire_count: u64,
    release_count: u64,
    fail_next_acquires: u32,
    fail_next_releases: u32,
    last_acquired_keys: Option<Vec<String>>,
}

/// In-memory lock service.
///
/// Same all-or-nothing-over-the-key-set semantics as the PostgreSQL
/// implementation, scoped to one process. Carries invocation counters and
/// failure-injection knobs for coordinator tests.
#[derive(Clone, Default)]
pub struct InMemoryLockService {
    state: Arc<RwLock<InMemoryLockState>>,
}

impl InMemoryLockService {
    /// Creates a new in-memory lock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` acquire calls fail as contended.
    pub fn fail_next_acquires(&self, n: u32) {
        self.state.write().unwrap().fail_next_acquires = n;
    }

    /// Makes the next `n` release calls fail.
    pub fn fail_next_releases(&self, n: u32) {
        self.state.write().unwrap().fail_next_releases = n;
    }

    /// Returns how many acquisitions have been attempted.
    pub fn acquire_count(&self) -> u64 {
        self.state.read().unwrap().acquire_count
    }

    /// Returns how many releases have been attempted.
    pub fn release_count(&self) -> u64 {
        self.state.read().unwrap().release_count
    }

    /// Returns the key set of the most recent successful acquisition.
    pub fn last_acquired_keys(&self) -> Option<Vec<String>> {
        self.state.read().unwrap().last_acquired_keys.clone()
    }

    /// Returns the number of currently held keys.
    pub fn held_count(&self) -> usize {
        let now = Instant::now();
        self.state
            .read()
            .unwrap()
            .held
            .values()
            .filter(|held| held.expires_at > now)
            .count()
    }

    fn try_acquire(&self, handle: &LockHandle, ttl: Duration) -> bool {
        let mut state = self.state.write().unwrap();
        let now = Instant::now();
        state.held.retain(|_, held| held.expires_at > now);

        if handle.keys().iter().any(|key| state.held.contains_key(key)) {
            return false;
        }

        for key in handle.keys() {
            state.held.insert(
                key.clone(),
                HeldKey {
                    token: handle.token(),
                    expires_at: now + ttl,
                },
            );
        }
        state.last_acquired_keys = Some(handle.keys().to_vec());
        true
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, keys: &[String], ttl: Duration) -> Result<LockHandle> {
        {
            let mut state = self.state.write().unwrap();
            state.acquire_count += 1;
            if state.fail_next_acquires > 0 {
                state.fail_next_acquires -= 1;
                return Err(LockError::Contended {
                    keys: keys.to_vec(),
                });
            }
        }

        let handle = LockHandle::new(keys.to_vec());
        for attempt in 0..=ACQUIRE_RETRY_COUNT {
            if self.try_acquire(&handle, ttl) {
                return Ok(handle);
            }
            if attempt < ACQUIRE_RETRY_COUNT {
                tokio::time::sleep(ACQUIRE_RETRY_DELAY).await;
            }
        }

        Err(LockError::Contended {
            keys: keys.to_vec(),
        })
    }

    async fn release(&self, handle: LockHandle) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.release_count += 1;
        if state.fail_next_releases > 0 {
            state.fail_next_releases -= 1;
            return Err(LockError::Backend(
                "injected release failure".to_string(),
            ));
        }

        for key in handle.keys() {
            if state
                .held
                .get(key)
                .is_some_and(|held| held.token == handle.token())
            {
                state.held.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn acquire_and_release_key_set() {
        let service = InMemoryLockService::new();
        let handle = service
            .acquire(&keys(&["a", "b"]), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(service.held_count(), 2);

        service.release(handle).await.unwrap();
        assert_eq!(service.held_count(), 0);
    }

    #[tokio::test]
    async fn overlapping_set_is_contended() {
        let service = InMemoryLockService::new();
        let _held = service
            .acquire(&keys(&["a", "b"]), Duration::from_secs(30))
            .await
            .unwrap();

        let result = service
            .acquire(&keys(&["b", "c"]), Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(LockError::Contended { .. })));

        // No partial hold of "c" survives the failed acquisition.
        assert_eq!(service.held_count(), 2);
    }

    #[tokio::test]
    async fn disjoint_sets_coexist() {
        let service = InMemoryLockService::new();
        let h1 = service
            .acquire(&keys(&["a"]), Duration::from_secs(2))
            .await
            .unwrap();
        let h2 = service
            .acquire(&keys(&["b"]), Duration::from_secs(2))
            .await
            .unwrap();

        service.release(h1).await.unwrap();
        service.release(h2).await.unwrap();
        assert_eq!(service.held_count(), 0);
    }

    #[tokio::test]
    async fn expired_keys_can_be_reacquired() {
        let service = InMemoryLockService::new();
        let stale = service
            .acquire(&keys(&["a"]), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = service
            .acquire(&keys(&["a"]), Duration::from_secs(2))
            .await
            .unwrap();

        // Releasing the stale handle must not evict the fresh holder.
        service.release(stale).await.unwrap();
        assert_eq!(service.held_count(), 1);
        service.release(fresh).await.unwrap();
    }

    #[tokio::test]
    async fn injected_failures() {
        let service = InMemoryLockService::new();
        service.fail_next_acquires(1);
        assert!(
            service
                .acquire(&keys(&["a"]), Duration::from_secs(2))
                .await
                .is_err()
        );

        let handle = service
            .acquire(&keys(&["a"]), Duration::from_secs(2))
            .await
            .unwrap();
        service.fail_next_releases(1);
        assert!(service.release(handle).await.is_err());
        assert_eq!(service.acquire_count(), 2);
        assert_eq!(service.release_count(), 1);
    }
}
