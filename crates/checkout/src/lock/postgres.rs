//! PostgreSQL-backed distributed lock.
//!
//! One row per held resource key in the shared `product_locks` table.
//! Acquisition purges expired rows, then inserts every requested key in a
//! single statement with `ON CONFLICT DO NOTHING`; the lock is taken only
//! if every key was inserted, otherwise the transaction rolls back and the
//! attempt is retried after a short delay.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use super::{
    ACQUIRE_RETRY_COUNT, ACQUIRE_RETRY_DELAY, LockError, LockHandle, LockService, Result,
};

/// Distributed lock service backed by the shared PostgreSQL database.
#[derive(Clone)]
pub struct PostgresLockService {
    pool: PgPool,
}

impl PostgresLockService {
    /// Connects the lock service, verifying the backend is reachable.
    ///
    /// Callers that cannot connect fall back to [`NoopLockService`] for
    /// the lifetime of the process.
    ///
    /// [`NoopLockService`]: super::NoopLockService
    pub async fn connect(pool: PgPool) -> Result<Self> {
        sqlx::query("SELECT 1").fetch_one(&pool).await?;
        Ok(Self { pool })
    }

    async fn try_acquire(&self, handle: &LockHandle, ttl: Duration) -> Result<bool> {
        let expires_at = Utc::now() + chrono::Duration::milliseconds(ttl.as_millis() as i64);

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_locks WHERE expires_at <= NOW()")
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO product_locks (key, holder, expires_at)
            SELECT unnest($1::text[]), $2, $3
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(handle.keys())
        .bind(handle.token())
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == handle.keys().len() as u64 {
            tx.commit().await?;
            Ok(true)
        } else {
            // Partial insert: some key is held by someone else. Roll back
            // so we hold nothing.
            tx.rollback().await?;
            Ok(false)
        }
    }
}

#[async_trait]
impl LockService for PostgresLockService {
    async fn acquire(&self, keys: &[String], ttl: Duration) -> Result<LockHandle> {
        let handle = LockHandle::new(keys.to_vec());

        for attempt in 0..=ACQUIRE_RETRY_COUNT {
            if self.try_acquire(&handle, ttl).await? {
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
        sqlx::query("DELETE FROM product_locks WHERE key = ANY($1) AND holder = $2")
            .bind(handle.keys())
            .bind(handle.token())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
