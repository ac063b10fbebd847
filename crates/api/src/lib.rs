//! HTTP API server for the POS backend.
//!
//! Exposes product management and sale creation over REST, with structured
//! logging (tracing) and Prometheus metrics. Sale creation goes through
//! [`checkout::SaleCoordinator`]; product reads go through a best-effort
//! read-through cache that sale commits invalidate.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use cache::{CacheStore, InMemoryCache};
use checkout::{InMemoryLockService, LockService, SaleCoordinator};
use metrics_exporter_prometheus::PrometheusHandle;
use store::SaleStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SaleStore> {
    pub store: S,
    pub coordinator: SaleCoordinator<S>,
    pub cache: Arc<dyn CacheStore>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SaleStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", post(routes::products::create::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/sales", post(routes::sales::create::<S>))
        .route("/sales/{id}", get(routes::sales::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state from explicitly chosen collaborators.
///
/// The lock service and cache are picked at startup (Postgres-backed when
/// a database is configured, in-memory or no-op otherwise); the
/// orchestration logic is the same either way.
pub fn create_state<S: SaleStore + Clone>(
    store: S,
    locks: Arc<dyn LockService>,
    cache: Arc<dyn CacheStore>,
) -> Arc<AppState<S>> {
    let coordinator = SaleCoordinator::new(store.clone(), locks, cache.clone());
    Arc::new(AppState {
        store,
        coordinator,
        cache,
    })
}

/// Creates application state with in-memory lock service and cache.
pub fn create_default_state<S: SaleStore + Clone>(store: S) -> Arc<AppState<S>> {
    create_state(
        store,
        Arc::new(InMemoryLockService::new()),
        Arc::new(InMemoryCache::new()),
    )
}
