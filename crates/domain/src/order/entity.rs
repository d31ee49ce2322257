//! Order entity.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ClientDetails, Money, OrderError, OrderProduct, OrderStatus, order_sum};

/// An order as stored by the orders service.
///
/// The status field is mutated only through [`Order::set_status`], inside a
/// row-locked transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub order_sum: Money,
    /// Key that lets an anonymous client read back their own order.
    pub secret_key: Uuid,
    pub details: ClientDetails,
    pub products: Vec<OrderProduct>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Applies a status transition from the transition table.
    pub fn set_status(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::CantSetStatus {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Replaces the product lines wholesale and recomputes the order sum.
    ///
    /// The order is left untouched when the new sum does not fit.
    pub fn replace_products(&mut self, products: Vec<OrderProduct>) -> Result<(), OrderError> {
        self.order_sum = order_sum(&products)?;
        self.products = products;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// An order that has not been persisted yet; the repository assigns its ID.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub details: ClientDetails,
    pub products: Vec<OrderProduct>,
    pub order_sum: Money,
    pub secret_key: Uuid,
}

impl NewOrder {
    /// Prepares an order, computing its sum.
    pub fn new(details: ClientDetails, products: Vec<OrderProduct>) -> Result<Self, OrderError> {
        Ok(Self {
            order_sum: order_sum(&products)?,
            details,
            products,
            secret_key: Uuid::new_v4(),
        })
    }

    /// Builds the stored order in status `New`.
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            status: OrderStatus::New,
            order_sum: self.order_sum,
            secret_key: self.secret_key,
            details: self.details,
            products: self.products,
            created_at,
            updated_at: None,
            deleted_at: None,
        }
    }
}
