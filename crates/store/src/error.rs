use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conflicting concurrent write to a product row was detected.
    /// The attempt saw state that was modified before it could commit;
    /// re-running the unit of work against fresh state may succeed.
    #[error("Concurrency conflict on product {product_id}")]
    ConcurrencyConflict { product_id: ProductId },

    /// A product with the same SKU already exists.
    #[error("Product with SKU '{0}' already exists")]
    DuplicateSku(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the error signals a transient write conflict that a
    /// fresh attempt may not hit again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
