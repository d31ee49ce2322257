//! Collaborators the order use cases depend on.

use async_trait::async_trait;
use common::{AppError, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderProduct, OrderStatus};

/// Catalog view of a product, as needed to price and validate an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    /// Stock not reserved by any order.
    pub stock_available: u32,
    pub is_published: bool,
}

/// Read access to the products catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns the known products among `ids`; unknown IDs are skipped.
    async fn get_products_by_ids(&self, ids: &[ProductId])
    -> Result<Vec<CatalogProduct>, AppError>;
}

/// Desired composition of an order. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionChange {
    pub products: Option<Vec<OrderProduct>>,
    pub status: Option<OrderStatus>,
}

/// Starts the saga that reserves an order's products and reports back.
///
/// Failures use the shared error kinds: `Conflict` when the catalog refused
/// the reservation, `BadRequest` for an empty change, `ServiceUnavailable`
/// when the caller stopped waiting while the saga keeps running.
#[async_trait]
pub trait ReservationSaga: Send + Sync {
    /// Reserves `products` and moves the order to `Created`, waiting for the outcome.
    async fn reserve_products(
        &self,
        order_id: OrderId,
        products: Vec<OrderProduct>,
    ) -> Result<(), AppError>;

    /// Applies a composition change. With `not_wait` the call returns once
    /// the saga has been accepted.
    async fn update_composition(
        &self,
        order_id: OrderId,
        change: CompositionChange,
        not_wait: bool,
    ) -> Result<(), AppError>;
}
