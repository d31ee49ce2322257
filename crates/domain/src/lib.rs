//! Orders domain for the product reservation system.
//!
//! This crate provides:
//! - The order entity and its status state machine
//! - Order repositories (PostgreSQL and in-memory) with row-locked updates
//! - The order use cases and the composition update the reservation saga reports
//! - Ports for the products catalog and the reservation saga

pub mod error;
pub mod order;

pub use error::DomainError;
pub use order::{
    CatalogProduct, ClientDetails, CompositionChange, CreateOrder, InMemoryOrderRepository,
    InvalidMoney, LockedOrder, Money, NewOrder, Order, OrderCompositionService, OrderError,
    OrderLineRequest, OrderProduct, OrderRepository, OrderService, OrderStatus,
    PostgresOrderRepository, ProductCatalog, RepositoryError, ReservationSaga,
    SetOrderComposition, UnknownStatus, UpdateOrder, order_sum,
};
