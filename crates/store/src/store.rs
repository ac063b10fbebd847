use async_trait::async_trait;
use common::{ProductId, SaleId, UserId};
use domain::{Money, NewProduct, NewSaleItem, Product, Sale};

use crate::Result;

/// Core trait for persistence store implementations.
///
/// All implementations must be thread-safe (Send + Sync); a store handle is
/// shared across concurrently running sale requests.
#[async_trait]
pub trait SaleStore: Send + Sync {
    /// The unit-of-work type returned by [`begin`](SaleStore::begin).
    type Tx: StoreTx;

    /// Starts a new unit of work.
    ///
    /// Everything done through the returned transaction is invisible to
    /// other callers until [`StoreTx::commit`]; dropping the transaction
    /// without committing discards it.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Reads a product outside any transaction.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Inserts a new product.
    ///
    /// Fails with [`StoreError::DuplicateSku`] if the SKU is already taken.
    ///
    /// [`StoreError::DuplicateSku`]: crate::StoreError::DuplicateSku
    async fn insert_product(&self, new_product: NewProduct) -> Result<Product>;

    /// Loads a sale with its items.
    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>>;
}

/// One atomic unit of work against the store.
///
/// The read in [`product_for_update`](StoreTx::product_for_update) is
/// consistent with the writes that follow in the same transaction: between
/// that read and commit, no other committed writer can have touched the row
/// without this transaction either waiting on it or failing with
/// `ConcurrencyConflict`. This is the property the checkout core's
/// read-then-decrement sequence relies on.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads a product row for a subsequent write in this transaction.
    ///
    /// Stock already decremented earlier in the same transaction is
    /// reflected in the returned row.
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Decrements a product's stock within this transaction.
    ///
    /// Fails with `ConcurrencyConflict` if fewer than `quantity` units
    /// remain, rather than ever taking the stock negative.
    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    /// Creates the sale row and its item rows within this transaction.
    async fn insert_sale(
        &mut self,
        user_id: UserId,
        total: Money,
        items: Vec<NewSaleItem>,
    ) -> Result<Sale>;

    /// Commits the unit of work, making all staged writes visible at once.
    async fn commit(self) -> Result<()>;
}
