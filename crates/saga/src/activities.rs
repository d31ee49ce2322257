//! The three activities of the order products saga.
//!
//! Each is a thin wrapper over a remote call and must be safe to run more
//! than once: reading is side-effect free, setting blocked products
//! replaces the whole set, and informing the orders service is applied
//! with store-and-compare semantics on the orders side.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, OrderId, ProductId};
use domain::{OrderProduct, OrderStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::to_transport_error;
use crate::runtime::{ActivityExecutor, ApplicationFailure};

/// A quantity of a product reserved for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedProduct {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl From<&OrderProduct> for BlockedProduct {
    fn from(product: &OrderProduct) -> Self {
        Self {
            product_id: product.product_id,
            quantity: product.quantity,
        }
    }
}

/// Composition report sent to the orders service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOrderCompositionRequest {
    pub order_id: OrderId,
    /// `false` reports that the saga failed; nothing else is set then.
    pub is_ok: bool,
    pub products: Option<Vec<OrderProduct>>,
    pub status: Option<OrderStatus>,
}

impl SetOrderCompositionRequest {
    pub fn failed(order_id: OrderId) -> Self {
        Self {
            order_id,
            is_ok: false,
            products: None,
            status: None,
        }
    }
}

/// Blocked-product calls of the products service.
#[async_trait]
pub trait ProductsClient: Send + Sync {
    async fn get_order_blocked_products(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<BlockedProduct>, AppError>;

    /// Replaces the order's blocked products; an empty list clears them.
    async fn set_order_blocked_products(
        &self,
        order_id: OrderId,
        products: Vec<BlockedProduct>,
    ) -> Result<(), AppError>;
}

/// Composition call of the orders service.
#[async_trait]
pub trait OrdersClient: Send + Sync {
    async fn set_order_composition(&self, request: SetOrderCompositionRequest)
    -> Result<(), AppError>;
}

/// Activity invocations, as recorded in workflow history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "activity", content = "input")]
pub enum ActivityRequest {
    GetOrderBlockedProducts {
        order_id: OrderId,
    },
    SetOrderBlockedProducts {
        order_id: OrderId,
        products: Vec<BlockedProduct>,
    },
    InformOrderComposition(SetOrderCompositionRequest),
}

impl ActivityRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ActivityRequest::GetOrderBlockedProducts { .. } => "GetOrderBlockedProducts",
            ActivityRequest::SetOrderBlockedProducts { .. } => "SetOrderBlockedProducts",
            ActivityRequest::InformOrderComposition(_) => "InformOrderComposition",
        }
    }
}

/// Executes [`ActivityRequest`]s against the products and orders services.
pub struct OrderProductsActivities {
    products: Arc<dyn ProductsClient>,
    orders: Arc<dyn OrdersClient>,
}

impl OrderProductsActivities {
    pub fn new(products: Arc<dyn ProductsClient>, orders: Arc<dyn OrdersClient>) -> Self {
        Self { products, orders }
    }

    async fn get_order_blocked_products(&self, order_id: OrderId) -> Result<Value, AppError> {
        let products = self.products.get_order_blocked_products(order_id).await?;
        tracing::info!(%order_id, count = products.len(), "got order blocked products");
        to_value(&products)
    }

    async fn set_order_blocked_products(
        &self,
        order_id: OrderId,
        products: &[BlockedProduct],
    ) -> Result<Value, AppError> {
        self.products
            .set_order_blocked_products(order_id, products.to_vec())
            .await?;
        tracing::info!(%order_id, count = products.len(), "set order blocked products");
        Ok(Value::Null)
    }

    async fn inform_order_composition(
        &self,
        request: &SetOrderCompositionRequest,
    ) -> Result<Value, AppError> {
        self.orders.set_order_composition(request.clone()).await?;
        tracing::info!(order_id = %request.order_id, is_ok = request.is_ok, "informed orders service");
        Ok(Value::Null)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::internal(e.to_string()))
}

#[async_trait]
impl ActivityExecutor for OrderProductsActivities {
    type Request = ActivityRequest;

    fn activity_name(request: &ActivityRequest) -> &'static str {
        request.name()
    }

    async fn execute(&self, request: &ActivityRequest) -> Result<Value, ApplicationFailure> {
        let result = match request {
            ActivityRequest::GetOrderBlockedProducts { order_id } => {
                self.get_order_blocked_products(*order_id).await
            }
            ActivityRequest::SetOrderBlockedProducts { order_id, products } => {
                self.set_order_blocked_products(*order_id, products).await
            }
            ActivityRequest::InformOrderComposition(inform) => {
                self.inform_order_composition(inform).await
            }
        };

        result.map_err(|e| {
            tracing::error!(activity = request.name(), error = %e, code = e.code(), "activity call failed");
            to_transport_error(&e)
        })
    }
}
