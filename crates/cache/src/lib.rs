//! Best-effort key/value cache for product reads.
//!
//! The read path caches serialized products under `product:{id}`; the
//! checkout core deletes those entries after a sale commits. Every
//! operation here is best-effort: callers log failures and carry on, and a
//! failed invalidation can never change the outcome of a committed sale.

pub mod memory;
pub mod noop;

use async_trait::async_trait;
use common::ProductId;
use std::time::Duration;
use thiserror::Error;

pub use memory::InMemoryCache;
pub use noop::NoopCache;

/// Errors that can occur when talking to the cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend rejected or failed the operation.
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache key for a product's serialized read entry.
pub fn product_cache_key(id: ProductId) -> String {
    format!("product:{id}")
}

/// Trait for cache store implementations.
///
/// Implementations must be thread-safe; one handle is shared by the read
/// path and the checkout core's invalidation step.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetches a cached value, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value under `key` for at most `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Removes a cached entry. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
