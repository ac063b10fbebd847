//! Product endpoints: creation and cached reads.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use cache::product_cache_key;
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{Money, NewProduct, Product};
use serde::{Deserialize, Serialize};
use store::SaleStore;

use crate::AppState;
use crate::error::ApiError;

/// How long a cached product read stays valid.
pub const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(60);

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub sku: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name,
            sku: product.sku,
            price_cents: product.price.cents(),
            stock_quantity: product.stock_quantity,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

// -- Handlers --

/// POST /products — create a new product.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: SaleStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(axum::http::StatusCode, Json<ProductResponse>), ApiError> {
    if req.price_cents < 0 {
        return Err(ApiError::BadRequest(
            "Price must be non-negative".to_string(),
        ));
    }

    let product = state
        .store
        .insert_product(NewProduct {
            name: req.name,
            sku: req.sku,
            price: Money::from_cents(req.price_cents),
            stock_quantity: req.stock_quantity,
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json(product.into())))
}

/// GET /products/:id — read a product through the cache.
///
/// A cache hit never touches the store; a miss loads the row and caches
/// it for [`PRODUCT_CACHE_TTL`]. Cache failures fall through to the store.
#[tracing::instrument(skip(state))]
pub async fn get<S: SaleStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let key = product_cache_key(product_id);

    match state.cache.get(&key).await {
        Ok(Some(cached)) => {
            if let Ok(product) = serde_json::from_str::<Product>(&cached) {
                return Ok(Json(product.into()));
            }
            tracing::warn!(key, "discarding undecodable cache entry");
        }
        Ok(None) => {}
        Err(err) => tracing::warn!(key, error = %err, "cache read failed"),
    }

    let product = state
        .store
        .get_product(product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    if let Ok(serialized) = serde_json::to_string(&product)
        && let Err(err) = state.cache.set(&key, &serialized, PRODUCT_CACHE_TTL).await
    {
        tracing::warn!(key, error = %err, "cache write failed");
    }

    Ok(Json(product.into()))
}

pub(crate) fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    uuid::Uuid::parse_str(id)
        .map(ProductId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid product id: {e}")))
}
