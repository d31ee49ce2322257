//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{
    ClientDetails, CreateOrder, Money, Order, OrderLineRequest, OrderService, OrderStatus,
    UpdateOrder,
};
use saga::InMemoryCatalog;
use saga::runtime::WorkflowEngine;
use saga::workflow::OrderProductsWorkflow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orders: OrderService,
    /// Stand-in for the remote products service.
    pub catalog: InMemoryCatalog,
    pub engine: WorkflowEngine<OrderProductsWorkflow>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct OrderRequest {
    #[serde(flatten)]
    pub details: ClientDetails,
    pub products: Vec<OrderLineRequest>,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct SecretKeyQuery {
    pub secret_key: Option<Uuid>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub status: OrderStatus,
    pub order_sum: Money,
    pub secret_key: Uuid,
    #[serde(flatten)]
    pub details: ClientDetails,
    pub products: Vec<OrderProductResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct OrderProductResponse {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
    pub total: Money,
}

#[derive(Serialize)]
pub struct StatusAcceptedResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            order_sum: order.order_sum,
            secret_key: order.secret_key,
            details: order.details,
            products: order
                .products
                .iter()
                .map(|p| OrderProductResponse {
                    product_id: p.product_id,
                    quantity: p.quantity,
                    price: p.price,
                    total: p.total(),
                })
                .collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

/// POST /orders: create an order and reserve its products.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .orders
        .create_order(CreateOrder::new(req.details, req.products))
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: load an order, optionally checking its secret key.
#[tracing::instrument(skip(state, query))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<SecretKeyQuery>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = OrderId::new(id);
    let order = match query.secret_key {
        Some(key) => state.orders.get_order_by_secret_key(id, key).await?,
        None => state.orders.get_order(id).await?,
    };

    Ok(Json(order.into()))
}

/// PUT /orders/{id}: replace an order's products and client details.
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<OrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .update_order(OrderId::new(id), UpdateOrder::new(req.details, req.products))
        .await?;

    Ok(Json(order.into()))
}

/// PUT /orders/{id}/status: request a status change.
///
/// Answers `202 Accepted` once the saga has taken the change over.
#[tracing::instrument(skip(state, req))]
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SetStatusRequest>,
) -> Result<(StatusCode, Json<StatusAcceptedResponse>), ApiError> {
    let order_id = OrderId::new(id);
    state.orders.set_status(order_id, req.status).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusAcceptedResponse {
            order_id,
            status: req.status,
        }),
    ))
}

/// DELETE /orders/{id}: remove an order that is still `new`.
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.orders.remove_order_if_new(OrderId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /orders/{id}/archive: hide a finished or canceled order.
#[tracing::instrument(skip(state))]
pub async fn archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.orders.archive_order(OrderId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
