//! Sale aggregate types.

use chrono::{DateTime, Utc};
use common::{ProductId, SaleId, SaleItemId, UserId};
use serde::{Deserialize, Serialize};

use crate::Money;

/// A committed sale with its items.
///
/// Sales are created once, atomically, and are immutable afterwards.
/// `total` always equals the sum of `price * quantity` over the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub user_id: UserId,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItem>,
}

/// One line of a committed sale.
///
/// `price` is the product price read inside the transaction that created
/// the sale, never the price the client sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: SaleItemId,
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// A requested sale line: which product and how many units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl SaleLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A validated sale line with its authoritative price, staged inside the
/// sale transaction before the sale row exists.
#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl NewSaleItem {
    /// The line total contributed to the sale total.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}
