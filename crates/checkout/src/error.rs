//! Checkout error types.

use common::ProductId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while creating a sale.
///
/// Domain errors describe the request relative to current data state;
/// everything else is infrastructure trouble that a fresh attempt may not
/// hit again.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request contained no items.
    #[error("Sale must contain at least one item")]
    EmptyCart,

    /// A requested line had a zero quantity.
    #[error("Invalid quantity for product {product_id}: must be at least 1")]
    InvalidQuantity { product_id: ProductId },

    /// A requested product does not exist.
    #[error("Product not found: {0}")]
    ItemNotFound(ProductId),

    /// A requested quantity exceeds the available stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Persistence store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Returns true for errors that are deterministic given current data
    /// state. Retrying these wastes a storage round-trip; they propagate
    /// to the caller on first occurrence.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            CheckoutError::EmptyCart
                | CheckoutError::InvalidQuantity { .. }
                | CheckoutError::ItemNotFound(_)
                | CheckoutError::InsufficientStock { .. }
        )
    }
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_not_retryable() {
        assert!(CheckoutError::EmptyCart.is_domain());
        assert!(CheckoutError::ItemNotFound(ProductId::new()).is_domain());
        assert!(
            CheckoutError::InsufficientStock {
                product_id: ProductId::new(),
                requested: 4,
                available: 2,
            }
            .is_domain()
        );
    }

    #[test]
    fn store_errors_are_retryable() {
        let err = CheckoutError::Store(StoreError::ConcurrencyConflict {
            product_id: ProductId::new(),
        });
        assert!(!err.is_domain());
    }
}
