//! HTTP API server for orders and the order products saga.
//!
//! Provides REST endpoints for order management, with structured logging
//! (tracing) and Prometheus metrics. [`build_state`] wires every component
//! by hand: stores, the catalog, the saga engine and its client façade.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{
    InMemoryOrderRepository, OrderCompositionService, OrderRepository, OrderService,
    PostgresOrderRepository,
};
use history::{HistoryStore, HistoryStoreError, InMemoryHistoryStore, PostgresHistoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryCatalog, OrderServiceClient, SagaClient, order_products_engine};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("History store error: {0}")]
    History(#[from] HistoryStoreError),
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route(
            "/orders/{id}",
            get(routes::orders::get)
                .put(routes::orders::update)
                .delete(routes::orders::remove),
        )
        .route("/orders/{id}/status", put(routes::orders::set_status))
        .route("/orders/{id}/archive", post(routes::orders::archive))
        .route(
            "/catalog/products/{id}",
            get(routes::catalog::get_product).put(routes::catalog::put_product),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the application state.
///
/// With a `DATABASE_URL` the orders and workflow history live in PostgreSQL
/// (migrations are applied here); without one every store is in memory.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, StartupError> {
    let (repo, history): (Arc<dyn OrderRepository>, Arc<dyn HistoryStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
                let history = PostgresHistoryStore::new(pool.clone());
                history.run_migrations().await?;
                tracing::info!("using PostgreSQL stores");
                let repo: Arc<dyn OrderRepository> = Arc::new(PostgresOrderRepository::new(pool));
                let history: Arc<dyn HistoryStore> = Arc::new(history);
                (repo, history)
            }
            None => {
                tracing::info!("using in-memory stores");
                let repo: Arc<dyn OrderRepository> = Arc::new(InMemoryOrderRepository::new());
                let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
                (repo, history)
            }
        };

    let catalog = InMemoryCatalog::new();
    let orders_client = OrderServiceClient::new(OrderCompositionService::new(Arc::clone(&repo)));

    let engine = order_products_engine(
        Arc::new(catalog.clone()),
        Arc::new(orders_client),
        history,
        config.saga_task_queue.clone(),
    );
    let saga_client = SagaClient::new(engine.clone())
        .with_task_queue(config.saga_task_queue.clone())
        .with_wait_timeout(config.saga_wait_timeout);

    let orders = OrderService::new(repo, Arc::new(catalog.clone()), Arc::new(saga_client));

    Ok(Arc::new(AppState {
        orders,
        catalog,
        engine,
    }))
}
