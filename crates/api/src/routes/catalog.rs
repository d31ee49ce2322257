//! Catalog endpoints backed by the in-process products catalog.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{AppError, ProductId};
use domain::{CatalogProduct, Money, ProductCatalog};
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

/// Highest accepted unit price: 1 000 000 000.00.
const MAX_PRICE_CENTS: i64 = 100_000_000_000;

#[derive(Deserialize)]
pub struct PutProductRequest {
    pub name: String,
    pub price: Money,
    pub stock: u32,
}

/// PUT /catalog/products/{id}: add or replace a product.
#[tracing::instrument(skip(state, req))]
pub async fn put_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<PutProductRequest>,
) -> Result<StatusCode, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("product name is required".to_string()));
    }
    if req.price.is_negative() {
        return Err(ApiError::BadRequest("price must not be negative".to_string()));
    }
    if req.price.cents() > MAX_PRICE_CENTS {
        return Err(ApiError::BadRequest(format!(
            "price must not exceed {}",
            Money::from_cents(MAX_PRICE_CENTS)
        )));
    }

    state
        .catalog
        .add_product(ProductId::new(id), req.name, req.price, req.stock)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /catalog/products/{id}: a product with its unreserved stock.
#[tracing::instrument(skip(state))]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CatalogProduct>, ApiError> {
    let product = state
        .catalog
        .get_products_by_ids(&[ProductId::new(id)])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("product not found"))?;

    Ok(Json(product))
}
