//! Distributed mutual exclusion over the products of a pending sale.
//!
//! A sale locks its *entire* product set in one acquisition rather than
//! taking one lock per product. Two sales over overlapping but
//! differently-ordered product sets can therefore never deadlock on lock
//! ordering; they either both get disjoint sets or one of them waits.
//!
//! Locks carry a fixed time-to-live, so a crashed holder blocks others for
//! at most [`LOCK_TTL`] even if its release never runs.

pub mod memory;
pub mod noop;
pub mod postgres;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use domain::SaleLine;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryLockService;
pub use noop::NoopLockService;
pub use postgres::PostgresLockService;

/// Maximum duration a lock is honored before automatic expiry.
pub const LOCK_TTL: Duration = Duration::from_millis(2000);

/// Additional acquisition attempts after the first.
pub const ACQUIRE_RETRY_COUNT: u32 = 3;

/// Delay between acquisition attempts.
pub const ACQUIRE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Errors that can occur when talking to the lock service.
#[derive(Debug, Error)]
pub enum LockError {
    /// No lock backend is configured or reachable for this process.
    #[error("Lock service is not available")]
    Unavailable,

    /// Another holder kept at least one of the requested keys through
    /// every acquisition attempt.
    #[error("Lock contended on resources: {keys:?}")]
    Contended { keys: Vec<String> },

    /// The lock backend failed the operation.
    #[error("Lock backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        LockError::Backend(err.to_string())
    }
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Proof of a held lock, passed back for release.
///
/// The token fences the release: only rows still owned by this holder are
/// removed, so releasing after expiry can never evict a later holder.
#[derive(Debug, Clone)]
pub struct LockHandle {
    token: Uuid,
    keys: Vec<String>,
}

impl LockHandle {
    /// Creates a handle with a fresh holder token.
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            token: Uuid::new_v4(),
            keys,
        }
    }

    /// The holder token identifying this acquisition.
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// The resource keys this handle holds.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Trait for distributed lock implementations.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquires a single logical lock over all of `keys`, or none of them.
    async fn acquire(&self, keys: &[String], ttl: Duration) -> Result<LockHandle>;

    /// Releases a held lock. Callers treat failures as best-effort: the
    /// TTL guarantees eventual release regardless.
    async fn release(&self, handle: LockHandle) -> Result<()>;
}

/// The sorted, de-duplicated lock keys for the products of a sale.
pub fn product_lock_keys(lines: &[SaleLine]) -> Vec<String> {
    lines
        .iter()
        .map(|line| product_lock_key(line.product_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn product_lock_key(id: ProductId) -> String {
    format!("locks:product:{id}")
}
