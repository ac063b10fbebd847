//! Sale coordinator: lock orchestration, bounded retries, and the atomic
//! sale transaction.

use std::collections::BTreeSet;
use std::sync::Arc;

use cache::{CacheStore, product_cache_key};
use common::UserId;
use domain::{Money, NewSaleItem, Sale, SaleLine};
use store::{SaleStore, StoreTx};

use crate::error::{CheckoutError, Result};
use crate::lock::{LOCK_TTL, LockError, LockService, product_lock_keys};

/// Attempt budget for the lock-less path.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Orchestrates the creation of one sale.
///
/// With a lock service available, the coordinator serializes sales that
/// share any product: it acquires one lock over the sale's whole product
/// set, runs the sale transaction exactly once, and releases. When the
/// lock service is unavailable or acquisition fails, it falls back to a
/// bounded retry loop over the same transaction, relying on the store to
/// reject one of two conflicting concurrent commits.
pub struct SaleCoordinator<S: SaleStore> {
    store: S,
    locks: Arc<dyn LockService>,
    cache: Arc<dyn CacheStore>,
}

impl<S: SaleStore> SaleCoordinator<S> {
    /// Creates a new sale coordinator.
    pub fn new(store: S, locks: Arc<dyn LockService>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            locks,
            cache,
        }
    }

    /// Creates a sale for `user_id` consuming stock for every line.
    ///
    /// Fails with a domain error ([`CheckoutError::EmptyCart`],
    /// [`CheckoutError::InvalidQuantity`], [`CheckoutError::ItemNotFound`],
    /// [`CheckoutError::InsufficientStock`]) without persisting anything,
    /// or returns the committed sale with its resolved items and
    /// authoritative total.
    #[tracing::instrument(skip(self, lines), fields(num_lines = lines.len()))]
    pub async fn create_sale(&self, user_id: UserId, lines: Vec<SaleLine>) -> Result<Sale> {
        metrics::counter!("sale_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.create_sale_inner(user_id, &lines).await;

        metrics::histogram!("sale_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(sale) => {
                metrics::counter!("sales_committed_total").increment(1);
                tracing::info!(sale_id = %sale.id, total = %sale.total, "sale committed");
            }
            Err(err) => {
                metrics::counter!("sales_failed_total").increment(1);
                tracing::debug!(error = %err, "sale failed");
            }
        }
        result
    }

    async fn create_sale_inner(&self, user_id: UserId, lines: &[SaleLine]) -> Result<Sale> {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(CheckoutError::InvalidQuantity {
                product_id: line.product_id,
            });
        }

        let keys = product_lock_keys(lines);
        match self.locks.acquire(&keys, LOCK_TTL).await {
            Ok(handle) => {
                tracing::debug!(?keys, "acquired product locks");
                let result = self.create_once(user_id, lines).await;
                if let Err(err) = self.locks.release(handle).await {
                    tracing::warn!(error = %err, "failed to release product locks");
                }
                result
            }
            Err(LockError::Unavailable) => self.create_with_retries(user_id, lines).await,
            Err(err) => {
                metrics::counter!("sale_lock_fallbacks_total").increment(1);
                tracing::warn!(
                    error = %err,
                    "failed to acquire product locks, falling back to transactional retry"
                );
                self.create_with_retries(user_id, lines).await
            }
        }
    }

    /// Runs the sale transaction up to [`RETRY_ATTEMPTS`] times.
    ///
    /// Domain errors propagate on first occurrence; anything else is
    /// assumed transient and retried against fresh state.
    async fn create_with_retries(&self, user_id: UserId, lines: &[SaleLine]) -> Result<Sale> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.create_once(user_id, lines).await {
                Ok(sale) => return Ok(sale),
                Err(err) if err.is_domain() => return Err(err),
                Err(err) if attempt >= RETRY_ATTEMPTS => return Err(err),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "sale attempt failed, retrying");
                }
            }
        }
    }

    /// One atomic attempt: validate every line, decrement stock, persist
    /// the sale with its items, commit, then invalidate cached reads.
    ///
    /// Every early return drops the transaction uncommitted, so a failure
    /// on the third line also rolls back the decrements of the first two.
    async fn create_once(&self, user_id: UserId, lines: &[SaleLine]) -> Result<Sale> {
        let mut tx = self.store.begin().await?;
        let mut total = Money::zero();
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            let product = tx
                .product_for_update(line.product_id)
                .await?
                .ok_or(CheckoutError::ItemNotFound(line.product_id))?;

            if !product.in_stock(line.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }

            tx.decrement_stock(product.id, line.quantity).await?;

            let item = NewSaleItem {
                product_id: product.id,
                quantity: line.quantity,
                price: product.price,
            };
            total += item.line_total();
            items.push(item);
        }

        let sale = tx.insert_sale(user_id, total, items).await?;
        tx.commit().await?;

        self.invalidate_products(lines).await;
        Ok(sale)
    }

    /// Deletes the cached read entry of every product in the sale.
    ///
    /// Runs after commit, outside the transaction; failures are logged
    /// and never change the outcome of the committed sale.
    async fn invalidate_products(&self, lines: &[SaleLine]) {
        let product_ids: BTreeSet<_> = lines.iter().map(|line| line.product_id).collect();
        for product_id in product_ids {
            let key = product_cache_key(product_id);
            if let Err(err) = self.cache.delete(&key).await {
                tracing::warn!(key, error = %err, "failed to invalidate product cache");
            }
        }
    }
}
