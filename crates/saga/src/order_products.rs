//! Identity, inputs and activity options of the order products saga.

use std::time::Duration;

use common::OrderId;
use domain::{OrderProduct, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::runtime::{ActivityOptions, RetryPolicy};

/// Workflow type name recorded in history.
pub const WORKFLOW_TYPE: &str = "OrderProducts";

/// Task queue served by the products worker.
pub const TASK_QUEUE: &str = "products-queue";

/// Prefix of the per-order workflow ID.
pub const WORKFLOW_ID_PREFIX: &str = "order_products";

/// Attempts of the snapshot read and of the reservation.
pub const LIMITED_ATTEMPTS: u32 = 3;

/// Start-to-close timeout of every attempt.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

pub const UNLIMITED_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
pub const UNLIMITED_MAXIMUM_INTERVAL: Duration = Duration::from_secs(30);

/// Returns the workflow ID of an order's saga: `order_products_<id>`.
pub fn workflow_id(order_id: OrderId) -> String {
    format!("{WORKFLOW_ID_PREFIX}_{order_id}")
}

/// Options for calls that must fail fast: the snapshot read and the reservation.
pub fn limited_options() -> ActivityOptions {
    ActivityOptions::new(ATTEMPT_TIMEOUT, RetryPolicy::limited(LIMITED_ATTEMPTS))
}

/// Options for calls that must eventually succeed: compensation and informing.
pub fn unlimited_options() -> ActivityOptions {
    ActivityOptions::new(
        ATTEMPT_TIMEOUT,
        RetryPolicy::unlimited(UNLIMITED_INITIAL_INTERVAL, UNLIMITED_MAXIMUM_INTERVAL),
    )
}

/// Input of one saga run. At least one of products and status must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaInput {
    pub order_id: OrderId,
    pub order_products: Option<Vec<OrderProduct>>,
    pub order_status: Option<OrderStatus>,
    /// Return to the caller once the run is accepted.
    pub not_wait: bool,
}

impl SagaInput {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            order_products: None,
            order_status: None,
            not_wait: false,
        }
    }

    pub fn with_products(mut self, products: Vec<OrderProduct>) -> Self {
        self.order_products = Some(products);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.order_status = Some(status);
        self
    }

    pub fn with_not_wait(mut self, not_wait: bool) -> Self {
        self.not_wait = not_wait;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_products.is_none() && self.order_status.is_none()
    }
}

/// Outcome codes of a saga run.
pub mod codes {
    pub const OK: u8 = 0;
    /// The reservation was refused or its outcome was ambiguous.
    pub const CANT_RESERVE: u8 = 1;
    pub const EMPTY_REQUEST: u8 = 2;
    pub const UNSPECIFIED: u8 = 99;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaResult {
    pub is_ok: bool,
    pub error_code: u8,
}

impl SagaResult {
    pub fn success() -> Self {
        Self {
            is_ok: true,
            error_code: codes::OK,
        }
    }

    pub fn failure(error_code: u8) -> Self {
        Self {
            is_ok: false,
            error_code,
        }
    }
}
