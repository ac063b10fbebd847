//! Atomic sale creation with inventory reservation.
//!
//! This crate is the concurrency-sensitive core of the POS backend. A sale
//! consumes stock from several products at once and must never
//! oversubscribe inventory, even when many server processes sell against
//! the same storage backend concurrently.
//!
//! [`SaleCoordinator::create_sale`] orchestrates each request:
//! 1. Try to take one distributed lock over the whole set of products in
//!    the sale. Holding it, run the sale transaction exactly once.
//! 2. Without a lock (none configured, or acquisition lost the race), run
//!    the transaction in a bounded retry loop, relying on the store's
//!    write-conflict detection to reject one of two racing commits.
//!
//! Either way the transaction itself is all-or-nothing: stock checks,
//! stock decrements, and the sale row with its items commit together or
//! not at all, and cached product reads are invalidated after commit.

pub mod coordinator;
pub mod error;
pub mod lock;

pub use coordinator::{RETRY_ATTEMPTS, SaleCoordinator};
pub use error::CheckoutError;
pub use lock::{
    InMemoryLockService, LOCK_TTL, LockError, LockHandle, LockService, NoopLockService,
    PostgresLockService, product_lock_keys,
};
