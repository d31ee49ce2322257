//! Orders and the order status state machine.

mod commands;
mod composition;
mod entity;
mod memory;
mod ports;
mod postgres;
mod repository;
mod service;
mod status;
mod value_objects;

pub use commands::{CreateOrder, OrderLineRequest, SetOrderComposition, UpdateOrder};
pub use composition::OrderCompositionService;
pub use entity::{NewOrder, Order};
pub use memory::InMemoryOrderRepository;
pub use ports::{CatalogProduct, CompositionChange, ProductCatalog, ReservationSaga};
pub use postgres::PostgresOrderRepository;
pub use repository::{LockedOrder, OrderRepository, RepositoryError};
pub use service::OrderService;
pub use status::{OrderStatus, UnknownStatus};
pub use value_objects::{ClientDetails, InvalidMoney, Money, OrderProduct, order_sum};

use common::{OrderId, ProductId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested status is not reachable from the current one.
    #[error("cant set status")]
    CantSetStatus { from: OrderStatus, to: OrderStatus },

    /// The order is canceled or finished and no longer accepts changes.
    #[error("order is {status}")]
    OrderClosed { status: OrderStatus },

    #[error("order is not new")]
    NotNew { status: OrderStatus },

    /// Only finished or canceled orders can be archived.
    #[error("order is not finished or canceled")]
    NotFinalized { status: OrderStatus },

    #[error("invalid quantity in #{product_id} product")]
    InvalidQuantity { product_id: ProductId },

    #[error("invalid price in #{product_id} product")]
    InvalidPrice { product_id: ProductId },

    /// A line total or the order sum does not fit the money range.
    #[error("order amount is too large")]
    AmountOverflow,

    /// Empty, duplicated, unknown or unpublished products.
    #[error("invalid products")]
    InvalidProducts,

    /// Not enough stock; one detail line per short product.
    #[error("invalid products quantity")]
    InsufficientStock { details: Vec<String> },

    #[error("products or status must be set")]
    EmptyComposition,

    #[error("order not found")]
    NotFound(OrderId),
}
