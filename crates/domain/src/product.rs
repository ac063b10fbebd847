//! Product catalog types.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::Money;

/// A product row: name, unique SKU, authoritative price, and available stock.
///
/// `stock_quantity` is only ever decremented inside the sale transaction;
/// it can never go negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if at least `quantity` units are available.
    pub fn in_stock(&self, quantity: u32) -> bool {
        self.stock_quantity >= quantity
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub stock_quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        Product {
            id: ProductId::new(),
            name: "Widget".to_string(),
            sku: "SKU-001".to_string(),
            price: Money::from_cents(1000),
            stock_quantity: 5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn in_stock_boundary() {
        let product = widget();
        assert!(product.in_stock(5));
        assert!(!product.in_stock(6));
    }

    #[test]
    fn in_stock_zero_quantity() {
        let product = widget();
        assert!(product.in_stock(0));
    }
}
