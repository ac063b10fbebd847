//! Sale endpoints: atomic creation and lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{SaleId, UserId};
use domain::{Sale, SaleItem, SaleLine};
use serde::{Deserialize, Serialize};
use store::SaleStore;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::products::parse_product_id;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateSaleRequest {
    /// Owner of the sale; generated when absent.
    pub user_id: Option<String>,
    pub items: Vec<SaleLineRequest>,
}

#[derive(Deserialize)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct SaleResponse {
    pub id: String,
    pub user_id: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItemResponse>,
}

#[derive(Serialize)]
pub struct SaleItemResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub price_cents: i64,
}

impl From<Sale> for SaleResponse {
    fn from(sale: Sale) -> Self {
        Self {
            id: sale.id.to_string(),
            user_id: sale.user_id.to_string(),
            total_cents: sale.total.cents(),
            created_at: sale.created_at,
            items: sale.items.into_iter().map(SaleItemResponse::from).collect(),
        }
    }
}

impl From<SaleItem> for SaleItemResponse {
    fn from(item: SaleItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            price_cents: item.price.cents(),
        }
    }
}

// -- Handlers --

/// POST /sales — atomically create a sale consuming stock for every line.
///
/// Note the request carries no prices; every item is priced from the
/// product row read inside the sale transaction.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: SaleStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateSaleRequest>,
) -> Result<(axum::http::StatusCode, Json<SaleResponse>), ApiError> {
    let user_id = if let Some(ref id_str) = req.user_id {
        let uuid = uuid::Uuid::parse_str(id_str)
            .map_err(|e| ApiError::BadRequest(format!("Invalid user_id: {e}")))?;
        UserId::from_uuid(uuid)
    } else {
        UserId::new()
    };

    let lines = req
        .items
        .iter()
        .map(|item| Ok(SaleLine::new(parse_product_id(&item.product_id)?, item.quantity)))
        .collect::<Result<Vec<_>, ApiError>>()?;

    let sale = state.coordinator.create_sale(user_id, lines).await?;

    Ok((axum::http::StatusCode::CREATED, Json(sale.into())))
}

/// GET /sales/:id — load a sale with its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: SaleStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SaleResponse>, ApiError> {
    let sale_id = uuid::Uuid::parse_str(&id)
        .map(SaleId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid sale id: {e}")))?;

    let sale = state
        .store
        .get_sale(sale_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sale {id} not found")))?;

    Ok(Json(sale.into()))
}
