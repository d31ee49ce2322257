//! Order persistence traits.

use async_trait::async_trait;
use common::OrderId;
use thiserror::Error;

use super::{NewOrder, Order};

/// Errors that can occur when reading or writing orders.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The transaction lost a race with a concurrent writer and was rolled back.
    #[error("Concurrent update of order {0}")]
    Conflict(OrderId),

    /// A stored row could not be mapped back to an order.
    #[error("Corrupt order row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage of orders and their product lines.
///
/// Soft-deleted orders are invisible to every read.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order in status `New` and returns it with its assigned ID.
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Loads an order with its product lines.
    async fn find(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Opens a transaction holding the order's row lock.
    ///
    /// Concurrent callers for the same order wait until the holder commits
    /// or drops its handle.
    async fn begin_locked(&self, id: OrderId) -> Result<Box<dyn LockedOrder>, RepositoryError>;
}

/// A transaction-scoped handle on one locked order.
///
/// Changes made through `order_mut` are persisted by `commit`. Dropping the
/// handle without committing rolls the transaction back.
#[async_trait]
pub trait LockedOrder: Send {
    fn order(&self) -> &Order;

    fn order_mut(&mut self) -> &mut Order;

    /// Persists the order row and replaces its product lines.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    /// Hard-deletes the order and its product lines.
    async fn delete(self: Box<Self>) -> Result<(), RepositoryError>;
}
