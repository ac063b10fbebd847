//! Transactional persistence store for products and sales.
//!
//! The [`SaleStore`] trait is the storage contract the checkout core runs
//! against: a sale and its items are created in one unit of work that reads
//! product rows consistently with the stock decrements that follow. Two
//! implementations are provided: [`PostgresStore`] for shared storage
//! across server processes, and [`InMemoryStore`] with commit-time conflict
//! detection for tests and storage-less deployments.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use store::{SaleStore, StoreTx};
