//! No-op lock service for processes without a lock backend.

use std::time::Duration;

use async_trait::async_trait;

use super::{LockError, LockHandle, LockService, Result};

/// Lock service that always reports unavailable.
///
/// Selected at construction time when no lock backend is configured or
/// reachable; every sale then goes through the transactional retry path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLockService;

#[async_trait]
impl LockService for NoopLockService {
    async fn acquire(&self, _keys: &[String], _ttl: Duration) -> Result<LockHandle> {
        Err(LockError::Unavailable)
    }

    async fn release(&self, _handle: LockHandle) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_unavailable() {
        let service = NoopLockService;
        let result = service
            .acquire(&["locks:product:1".to_string()], Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(LockError::Unavailable)));
    }
}
