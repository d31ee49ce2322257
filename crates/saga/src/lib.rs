//! Order products reservation saga.
//!
//! This crate runs the saga that keeps an order's blocked products in the
//! catalog consistent with the order's composition:
//! 1. Read the order's current blocked products (the snapshot)
//! 2. Replace them with the requested products
//! 3. Report the composition or status to the orders service
//!
//! If the reservation outcome is unknown, or the orders service rejects the
//! report, the snapshot is restored. Runs execute on a small durable
//! runtime ([`runtime`]) that records every step so they survive restarts.

pub mod activities;
pub mod bridge;
pub mod client;
pub mod error;
pub mod order_products;
pub mod runtime;
pub mod services;
pub mod state;
pub mod workflow;

pub use activities::{
    ActivityRequest, BlockedProduct, OrderProductsActivities, OrdersClient, ProductsClient,
    SetOrderCompositionRequest,
};
pub use bridge::{TransportError, WRAP_ERROR_TYPE, from_transport_error, to_transport_error};
pub use client::{DEFAULT_WAIT_TIMEOUT, SagaClient};
pub use error::{SagaError, WorkflowError};
pub use order_products::{SagaInput, SagaResult, TASK_QUEUE, workflow_id};
pub use services::{InMemoryCatalog, OrderServiceClient};
pub use state::SagaState;
pub use workflow::OrderProductsWorkflow;

use std::sync::Arc;

use history::HistoryStore;
use runtime::WorkflowEngine;

/// Builds the saga engine over the given collaborators.
pub fn order_products_engine(
    products: Arc<dyn ProductsClient>,
    orders: Arc<dyn OrdersClient>,
    store: Arc<dyn HistoryStore>,
    task_queue: impl Into<String>,
) -> WorkflowEngine<OrderProductsWorkflow> {
    WorkflowEngine::new(
        OrderProductsWorkflow,
        Arc::new(OrderProductsActivities::new(products, orders)),
        store,
        task_queue,
    )
}
