//! Order commands.

use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use super::{ClientDetails, OrderProduct, OrderStatus};

/// A requested product line; the price is resolved from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLineRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Command to create a new order and reserve its products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    pub details: ClientDetails,
    pub products: Vec<OrderLineRequest>,
}

impl CreateOrder {
    pub fn new(details: ClientDetails, products: Vec<OrderLineRequest>) -> Self {
        Self { details, products }
    }
}

/// Command to replace an order's products and client details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrder {
    pub details: ClientDetails,
    pub products: Vec<OrderLineRequest>,
}

impl UpdateOrder {
    pub fn new(details: ClientDetails, products: Vec<OrderLineRequest>) -> Self {
        Self { details, products }
    }
}

/// Command reported by the reservation saga once products are reserved.
///
/// At least one of `products` and `status` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOrderComposition {
    pub order_id: OrderId,
    pub products: Option<Vec<OrderProduct>>,
    pub status: Option<OrderStatus>,
}

impl SetOrderComposition {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            products: None,
            status: None,
        }
    }

    pub fn with_products(mut self, products: Vec<OrderProduct>) -> Self {
        self.products = Some(products);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }
}
