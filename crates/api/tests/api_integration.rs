//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use common::ProductId;
use domain::Money;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

use api::config::Config;
use api::routes::AppState;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// App with an in-memory setup and a catalog of two products.
async fn setup() -> (axum::Router, Arc<AppState>) {
    let state = api::build_state(&Config::default()).await.unwrap();
    state
        .catalog
        .add_product(ProductId::new(1), "Lamp", Money::from_cents(1000), 5)
        .await;
    state
        .catalog
        .add_product(ProductId::new(2), "Chair", Money::from_cents(2500), 1)
        .await;
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn order_body(products: Value) -> Value {
    json!({
        "client_name": "Ada",
        "client_surname": "Lovelace",
        "client_email": "ada@example.com",
        "client_phone": "+44 20 0000 0000",
        "delivery_address": "12 St James's Square, London",
        "products": products,
    })
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn create_order(app: &axum::Router, products: Value) -> Value {
    let response = send(app, "POST", "/orders", Some(order_body(products))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let response = send(&app, "GET", "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["task_queue"], "products-queue");
}

#[tokio::test]
async fn test_create_order_reserves_products() {
    let (app, state) = setup().await;

    let order = create_order(&app, json!([{"product_id": 1, "quantity": 2}])).await;

    assert_eq!(order["status"], "created");
    assert_eq!(order["order_sum"], "20.00");
    assert_eq!(order["client_name"], "Ada");
    assert_eq!(order["products"][0]["price"], "10.00");
    assert_eq!(order["products"][0]["total"], "20.00");
    assert_eq!(state.catalog.available(ProductId::new(1)).await, 3);
}

#[tokio::test]
async fn test_create_order_with_insufficient_stock() {
    let (app, state) = setup().await;

    let response = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(json!([{"product_id": 2, "quantity": 3}]))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["code"], 400);
    assert_eq!(json["message"], "invalid products quantity");
    assert_eq!(
        json["details"][0],
        "available stock for product \"Chair\": 1 pcs"
    );
    assert_eq!(state.catalog.available(ProductId::new(2)).await, 1);
}

#[tokio::test]
async fn test_create_order_with_unknown_product() {
    let (app, _) = setup().await;

    let response = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(json!([{"product_id": 42, "quantity": 1}]))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "invalid products");
}

#[tokio::test]
async fn test_get_order_with_secret_key() {
    let (app, _) = setup().await;
    let order = create_order(&app, json!([{"product_id": 1, "quantity": 1}])).await;
    let id = order["id"].as_i64().unwrap();
    let key = order["secret_key"].as_str().unwrap();

    let response = send(&app, "GET", &format!("/orders/{id}?secret_key={key}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], id);

    let wrong = uuid::Uuid::new_v4();
    let response = send(&app, "GET", &format!("/orders/{id}?secret_key={wrong}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], 404);
}

#[tokio::test]
async fn test_get_unknown_order() {
    let (app, _) = setup().await;

    let response = send(&app, "GET", "/orders/999", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_order_replaces_products() {
    let (app, state) = setup().await;
    let order = create_order(&app, json!([{"product_id": 1, "quantity": 2}])).await;
    let id = order["id"].as_i64().unwrap();

    let response = send(
        &app,
        "PUT",
        &format!("/orders/{id}"),
        Some(order_body(json!([
            {"product_id": 1, "quantity": 1},
            {"product_id": 2, "quantity": 1}
        ]))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response).await;
    assert_eq!(updated["order_sum"], "35.00");
    assert_eq!(updated["products"].as_array().unwrap().len(), 2);
    assert_eq!(state.catalog.available(ProductId::new(1)).await, 4);
    assert_eq!(state.catalog.available(ProductId::new(2)).await, 0);
}

#[tokio::test]
async fn test_update_beyond_stock_is_rejected() {
    let (app, state) = setup().await;
    let order = create_order(&app, json!([{"product_id": 1, "quantity": 2}])).await;
    let id = order["id"].as_i64().unwrap();

    let response = send(
        &app,
        "PUT",
        &format!("/orders/{id}"),
        Some(order_body(json!([{"product_id": 1, "quantity": 9}]))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["message"], "invalid products quantity");
    assert_eq!(state.catalog.available(ProductId::new(1)).await, 3);
}

#[tokio::test]
async fn test_status_change_is_applied_asynchronously() {
    let (app, _) = setup().await;
    let order = create_order(&app, json!([{"product_id": 1, "quantity": 1}])).await;
    let id = order["id"].as_i64().unwrap();

    let response = send(
        &app,
        "PUT",
        &format!("/orders/{id}/status"),
        Some(json!({"status": "in_work"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    for _ in 0..100 {
        let order = json_body(send(&app, "GET", &format!("/orders/{id}"), None).await).await;
        if order["status"] == "in_work" {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("status change was never applied");
}

#[tokio::test]
async fn test_invalid_status_transition() {
    let (app, _) = setup().await;
    let order = create_order(&app, json!([{"product_id": 1, "quantity": 1}])).await;
    let id = order["id"].as_i64().unwrap();

    let response = send(
        &app,
        "PUT",
        &format!("/orders/{id}/status"),
        Some(json!({"status": "finished"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["message"], "cant set status");
    assert_eq!(json["details"][0], "created -> finished");
}

#[tokio::test]
async fn test_only_new_orders_can_be_removed() {
    let (app, _) = setup().await;
    let order = create_order(&app, json!([{"product_id": 1, "quantity": 1}])).await;
    let id = order["id"].as_i64().unwrap();

    let response = send(&app, "DELETE", &format!("/orders/{id}"), None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "order is not new");
}

#[tokio::test]
async fn test_archive_requires_closed_order() {
    let (app, _) = setup().await;
    let order = create_order(&app, json!([{"product_id": 1, "quantity": 1}])).await;
    let id = order["id"].as_i64().unwrap();

    let response = send(&app, "POST", &format!("/orders/{id}/archive"), None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["message"],
        "order is not finished or canceled"
    );
}

#[tokio::test]
async fn test_catalog_product_roundtrip() {
    let (app, _) = setup().await;

    let response = send(
        &app,
        "PUT",
        "/catalog/products/7",
        Some(json!({"name": "Desk", "price": "149.90", "stock": 2})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, "GET", "/catalog/products/7", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let product = json_body(response).await;
    assert_eq!(product["name"], "Desk");
    assert_eq!(product["price"], "149.90");
    assert_eq!(product["stock_available"], 2);

    let response = send(&app, "GET", "/catalog/products/8", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog_rejects_oversized_price() {
    let (app, _) = setup().await;

    let response = send(
        &app,
        "PUT",
        "/catalog/products/9",
        Some(json!({"name": "Yacht", "price": "92233720368547758.07", "stock": 1})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["message"],
        "price must not exceed 1000000000.00"
    );
    let response = send(&app, "GET", "/catalog/products/9", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_total_beyond_money_range_is_rejected() {
    let (app, state) = setup().await;
    state
        .catalog
        .add_product(ProductId::new(9), "Yacht", Money::from_cents(i64::MAX), 5)
        .await;

    let response = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(json!([{"product_id": 9, "quantity": 2}]))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "order amount is too large");
    assert_eq!(state.catalog.available(ProductId::new(9)).await, 5);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup().await;
    create_order(&app, json!([{"product_id": 1, "quantity": 1}])).await;

    let response = send(&app, "GET", "/metrics", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_started_total"));
}
