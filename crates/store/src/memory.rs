use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ProductId, SaleId, SaleItemId, UserId};
use domain::{Money, NewProduct, NewSaleItem, Product, Sale, SaleItem};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{SaleStore, StoreTx},
};

struct StoredProduct {
    product: Product,
    version: u64,
}

#[derive(Default)]
struct InMemoryState {
    products: HashMap<ProductId, StoredProduct>,
    sales: HashMap<SaleId, Sale>,
    fail_commits: u32,
    begin_count: u64,
}

/// In-memory persistence store.
///
/// Provides the same contract as the PostgreSQL implementation: a
/// transaction stages its writes and re-validates the version of every
/// product row it read when it commits, failing with `ConcurrencyConflict`
/// if a concurrent transaction committed a change to one of them first.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail with a concurrency conflict.
    pub async fn fail_next_commits(&self, n: u32) {
        self.state.write().await.fail_commits = n;
    }

    /// Returns how many transactions have been started.
    pub async fn begin_count(&self) -> u64 {
        self.state.read().await.begin_count
    }

    /// Returns the number of committed sales.
    pub async fn sale_count(&self) -> usize {
        self.state.read().await.sales.len()
    }
}

#[async_trait]
impl SaleStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        self.state.write().await.begin_count += 1;
        Ok(InMemoryTx {
            state: self.state.clone(),
            read_versions: HashMap::new(),
            decrements: Vec::new(),
            staged_sale: None,
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.get(&id).map(|s| s.product.clone()))
    }

    async fn insert_product(&self, new_product: NewProduct) -> Result<Product> {
        let mut state = self.state.write().await;

        if state
            .products
            .values()
            .any(|s| s.product.sku == new_product.sku)
        {
            return Err(StoreError::DuplicateSku(new_product.sku));
        }

        let product = Product {
            id: ProductId::new(),
            name: new_product.name,
            sku: new_product.sku,
            price: new_product.price,
            stock_quantity: new_product.stock_quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        state.products.insert(
            product.id,
            StoredProduct {
                product: product.clone(),
                version: 0,
            },
        );

        Ok(product)
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>> {
        let state = self.state.read().await;
        Ok(state.sales.get(&id).cloned())
    }
}

/// An in-memory unit of work.
///
/// All writes are staged locally; nothing is visible to other callers
/// until [`commit`](StoreTx::commit). Dropping the transaction discards
/// the staged writes.
pub struct InMemoryTx {
    state: Arc<RwLock<InMemoryState>>,
    read_versions: HashMap<ProductId, u64>,
    decrements: Vec<(ProductId, u32)>,
    staged_sale: Option<Sale>,
}

impl InMemoryTx {
    fn staged_decrement(&self, id: ProductId) -> u32 {
        self.decrements
            .iter()
            .filter(|(pid, _)| *pid == id)
            .map(|(_, qty)| qty)
            .sum()
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        let Some(stored) = state.products.get(&id) else {
            return Ok(None);
        };

        self.read_versions.entry(id).or_insert(stored.version);

        // Reflect decrements already staged in this transaction, the same
        // way a FOR UPDATE re-read sees earlier updates of the same tx.
        let mut product = stored.product.clone();
        product.stock_quantity = product
            .stock_quantity
            .saturating_sub(self.staged_decrement(id));

        Ok(Some(product))
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let state = self.state.read().await;
        let Some(stored) = state.products.get(&id) else {
            return Err(StoreError::ConcurrencyConflict { product_id: id });
        };

        self.read_versions.entry(id).or_insert(stored.version);

        let available = stored
            .product
            .stock_quantity
            .saturating_sub(self.staged_decrement(id));
        if available < quantity {
            return Err(StoreError::ConcurrencyConflict { product_id: id });
        }

        drop(state);
        self.decrements.push((id, quantity));
        Ok(())
    }

    async fn insert_sale(
        &mut self,
        user_id: UserId,
        total: Money,
        items: Vec<NewSaleItem>,
    ) -> Result<Sale> {
        let sale_id = SaleId::new();
        let sale = Sale {
            id: sale_id,
            user_id,
            total,
            created_at: Utc::now(),
            items: items
                .into_iter()
                .map(|item| SaleItem {
                    id: SaleItemId::new(),
                    sale_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        };

        self.staged_sale = Some(sale.clone());
        Ok(sale)
    }

    async fn commit(self) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            let product_id = self
                .decrements
                .first()
                .map(|(id, _)| *id)
                .or_else(|| self.read_versions.keys().next().copied())
                .unwrap_or_default();
            return Err(StoreError::ConcurrencyConflict { product_id });
        }

        // Re-validate every product read in this transaction.
        for (id, version) in &self.read_versions {
            match state.products.get(id) {
                Some(stored) if stored.version == *version => {}
                _ => return Err(StoreError::ConcurrencyConflict { product_id: *id }),
            }
        }

        for (id, quantity) in &self.decrements {
            let stored = state
                .products
                .get_mut(id)
                .ok_or(StoreError::ConcurrencyConflict { product_id: *id })?;
            if stored.product.stock_quantity < *quantity {
                return Err(StoreError::ConcurrencyConflict { product_id: *id });
            }
            stored.product.stock_quantity -= quantity;
            stored.product.updated_at = Utc::now();
            stored.version += 1;
        }

        if let Some(sale) = self.staged_sale {
            state.sales.insert(sale.id, sale);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_product(store: &InMemoryStore, stock: u32, cents: i64) -> Product {
        store
            .insert_product(NewProduct {
                name: "Widget".to_string(),
                sku: format!("SKU-{}", ProductId::new()),
                price: Money::from_cents(cents),
                stock_quantity: stock,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_product() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 5, 1000).await;

        let loaded = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(loaded, product);
    }

    #[tokio::test]
    async fn duplicate_sku_rejected() {
        let store = InMemoryStore::new();
        let new = NewProduct {
            name: "Widget".to_string(),
            sku: "SKU-001".to_string(),
            price: Money::from_cents(1000),
            stock_quantity: 5,
        };

        store.insert_product(new.clone()).await.unwrap();
        let result = store.insert_product(new).await;
        assert!(matches!(result, Err(StoreError::DuplicateSku(_))));
    }

    #[tokio::test]
    async fn missing_product_reads_none() {
        let store = InMemoryStore::new();
        assert!(store.get_product(ProductId::new()).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        assert!(
            tx.product_for_update(ProductId::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn commit_applies_decrements_and_sale() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 5, 1000).await;
        let user_id = UserId::new();

        let mut tx = store.begin().await.unwrap();
        let read = tx.product_for_update(product.id).await.unwrap().unwrap();
        assert_eq!(read.stock_quantity, 5);

        tx.decrement_stock(product.id, 3).await.unwrap();
        let sale = tx
            .insert_sale(
                user_id,
                Money::from_cents(3000),
                vec![NewSaleItem {
                    product_id: product.id,
                    quantity: 3,
                    price: Money::from_cents(1000),
                }],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock_quantity, 2);

        let loaded = store.get_sale(sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, user_id);
        assert_eq!(loaded.total, Money::from_cents(3000));
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].quantity, 3);
    }

    #[tokio::test]
    async fn reads_reflect_staged_decrements() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 5, 1000).await;

        let mut tx = store.begin().await.unwrap();
        tx.decrement_stock(product.id, 4).await.unwrap();

        let read = tx.product_for_update(product.id).await.unwrap().unwrap();
        assert_eq!(read.stock_quantity, 1);

        // A second decrement past the remaining stock is refused.
        let result = tx.decrement_stock(product.id, 2).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn drop_without_commit_discards_staged_writes() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 5, 1000).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.decrement_stock(product.id, 3).await.unwrap();
        }

        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock_quantity, 5);
        assert_eq!(store.sale_count().await, 0);
    }

    #[tokio::test]
    async fn interleaved_commit_conflicts() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 5, 1000).await;

        let mut tx1 = store.begin().await.unwrap();
        tx1.product_for_update(product.id).await.unwrap().unwrap();

        // A second transaction commits a decrement first.
        let mut tx2 = store.begin().await.unwrap();
        tx2.product_for_update(product.id).await.unwrap().unwrap();
        tx2.decrement_stock(product.id, 1).await.unwrap();
        tx2.commit().await.unwrap();

        tx1.decrement_stock(product.id, 1).await.unwrap();
        let result = tx1.commit().await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));

        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock_quantity, 4);
    }

    #[tokio::test]
    async fn fail_next_commits_injects_transient_conflicts() {
        let store = InMemoryStore::new();
        let product = seed_product(&store, 5, 1000).await;
        store.fail_next_commits(1).await;

        let mut tx = store.begin().await.unwrap();
        tx.decrement_stock(product.id, 1).await.unwrap();
        assert!(tx.commit().await.is_err());

        // The injection is consumed; the next attempt goes through.
        let mut tx = store.begin().await.unwrap();
        tx.decrement_stock(product.id, 1).await.unwrap();
        tx.commit().await.unwrap();

        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock_quantity, 4);
        assert_eq!(store.begin_count().await, 2);
    }
}
