//! Concurrency tests for sale creation.
//!
//! These drive the coordinator from parallel tasks over a shared in-memory
//! store and assert the inventory invariants: stock is never observed
//! negative and the sum of committed decrements never exceeds the initial
//! stock, with or without the lock service.

use std::sync::Arc;

use cache::InMemoryCache;
use checkout::{CheckoutError, InMemoryLockService, NoopLockService, SaleCoordinator};
use common::UserId;
use domain::{Money, NewProduct, Product, Sale, SaleLine};
use store::{InMemoryStore, SaleStore};

async fn seed_product(store: &InMemoryStore, sku: &str, stock: u32, cents: i64) -> Product {
    store
        .insert_product(NewProduct {
            name: format!("Product {sku}"),
            sku: sku.to_string(),
            price: Money::from_cents(cents),
            stock_quantity: stock,
        })
        .await
        .unwrap()
}

fn without_locks(store: &InMemoryStore) -> Arc<SaleCoordinator<InMemoryStore>> {
    Arc::new(SaleCoordinator::new(
        store.clone(),
        Arc::new(NoopLockService),
        Arc::new(InMemoryCache::new()),
    ))
}

fn with_locks(store: &InMemoryStore) -> Arc<SaleCoordinator<InMemoryStore>> {
    Arc::new(SaleCoordinator::new(
        store.clone(),
        Arc::new(InMemoryLockService::new()),
        Arc::new(InMemoryCache::new()),
    ))
}

fn committed_quantity(results: &[Result<Sale, CheckoutError>]) -> u32 {
    results
        .iter()
        .flatten()
        .flat_map(|sale| sale.items.iter())
        .map(|item| item.quantity)
        .sum()
}

#[tokio::test]
async fn competing_sales_never_oversubscribe_without_locks() {
    let store = InMemoryStore::new();
    let product = seed_product(&store, "SKU-001", 5, 1000).await;
    let coordinator = without_locks(&store);

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .create_sale(UserId::new(), vec![SaleLine::new(product.id, 3)])
                .await
        })
    };
    let second = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .create_sale(UserId::new(), vec![SaleLine::new(product.id, 4)])
                .await
        })
    };

    let results = vec![first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    // The loser sees fresh state on retry and fails the stock check.
    let failure = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        failure,
        Err(CheckoutError::InsufficientStock { .. })
    ));

    let committed = committed_quantity(&results);
    assert!(committed <= 5);
    let after = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(after.stock_quantity, 5 - committed);
}

#[tokio::test]
async fn competing_sales_never_oversubscribe_with_locks() {
    let store = InMemoryStore::new();
    let product = seed_product(&store, "SKU-001", 5, 1000).await;
    let coordinator = with_locks(&store);

    let mut handles = Vec::new();
    for quantity in [3u32, 4] {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .create_sale(UserId::new(), vec![SaleLine::new(product.id, quantity)])
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let committed = committed_quantity(&results);
    let after = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(after.stock_quantity, 5 - committed);
}

#[tokio::test]
async fn oversubscription_sweep_preserves_stock_invariant() {
    let store = InMemoryStore::new();
    let product = seed_product(&store, "SKU-001", 10, 500).await;
    let coordinator = without_locks(&store);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .create_sale(UserId::new(), vec![SaleLine::new(product.id, 1)])
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let committed = committed_quantity(&results);
    assert!(committed <= 10);

    let after = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(after.stock_quantity, 10 - committed);
    assert_eq!(store.sale_count().await, committed as usize);

    // Failures are only stock shortfalls or exhausted conflict retries.
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    CheckoutError::InsufficientStock { .. } | CheckoutError::Store(_)
                ),
                "unexpected failure: {err}"
            );
        }
    }
}

#[tokio::test]
async fn disjoint_product_sets_proceed_in_parallel() {
    let store = InMemoryStore::new();
    let widget = seed_product(&store, "SKU-001", 5, 1000).await;
    let gadget = seed_product(&store, "SKU-002", 5, 2000).await;
    let coordinator = with_locks(&store);

    let mut handles = Vec::new();
    for product_id in [widget.id, gadget.id] {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .create_sale(UserId::new(), vec![SaleLine::new(product_id, 2)])
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let widget_after = store.get_product(widget.id).await.unwrap().unwrap();
    let gadget_after = store.get_product(gadget.id).await.unwrap().unwrap();
    assert_eq!(widget_after.stock_quantity, 3);
    assert_eq!(gadget_after.stock_quantity, 3);
}

#[tokio::test]
async fn multi_product_sales_commit_atomically_under_contention() {
    let store = InMemoryStore::new();
    let widget = seed_product(&store, "SKU-001", 4, 1000).await;
    let gadget = seed_product(&store, "SKU-002", 4, 2000).await;
    let coordinator = without_locks(&store);

    // Four tasks each buy one of each; at most four such sales fit.
    let mut handles = Vec::new();
    for _ in 0..6 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .create_sale(
                    UserId::new(),
                    vec![SaleLine::new(widget.id, 1), SaleLine::new(gadget.id, 1)],
                )
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert!(successes <= 4);

    // Both products always move in lockstep: a failed sale decrements
    // neither, a committed sale decrements both.
    let widget_after = store.get_product(widget.id).await.unwrap().unwrap();
    let gadget_after = store.get_product(gadget.id).await.unwrap().unwrap();
    assert_eq!(widget_after.stock_quantity, gadget_after.stock_quantity);
    assert_eq!(widget_after.stock_quantity, 4 - successes as u32);

    for sale in results.iter().flatten() {
        assert_eq!(sale.total, Money::from_cents(3000));
        assert_eq!(sale.items.len(), 2);
    }
}
