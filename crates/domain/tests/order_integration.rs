//! PostgreSQL integration tests for the order repository and the
//! composition update.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test order_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{OrderId, ProductId};
use domain::{
    ClientDetails, DomainError, Money, NewOrder, OrderCompositionService, OrderError,
    OrderProduct, OrderRepository, OrderStatus, PostgresOrderRepository, RepositoryError,
    SetOrderComposition,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/002_create_orders.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_repo() -> PostgresOrderRepository {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderRepository::new(pool)
}

fn line(id: i64, quantity: u32, cents: i64) -> OrderProduct {
    OrderProduct::new(ProductId::new(id), quantity, Money::from_cents(cents)).unwrap()
}

fn details() -> ClientDetails {
    ClientDetails {
        client_name: "Ada".to_string(),
        client_surname: "Lovelace".to_string(),
        client_email: "ada@example.com".to_string(),
        client_phone: "+100000000".to_string(),
        delivery_address: "12 Analytical St".to_string(),
    }
}

#[tokio::test]
#[serial]
async fn insert_and_find_round_trip() {
    let repo = get_test_repo().await;

    let order = repo
        .insert(NewOrder::new(details(), vec![line(1, 2, 1000), line(2, 1, 250)]).unwrap())
        .await
        .unwrap();

    let found = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(found.status, OrderStatus::New);
    assert_eq!(found.order_sum, Money::from_cents(2250));
    assert_eq!(found.details, details());
    assert_eq!(found.secret_key, order.secret_key);
    assert_eq!(found.products.len(), 2);

    assert!(repo.find(OrderId::new(999)).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn locked_commit_replaces_products() {
    let repo = get_test_repo().await;
    let order = repo
        .insert(NewOrder::new(details(), vec![line(1, 2, 1000)]).unwrap())
        .await
        .unwrap();

    let mut locked = repo.begin_locked(order.id).await.unwrap();
    locked.order_mut().set_status(OrderStatus::Created).unwrap();
    locked
        .order_mut()
        .replace_products(vec![line(3, 4, 100)])
        .unwrap();
    locked.commit().await.unwrap();

    let found = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(found.status, OrderStatus::Created);
    assert_eq!(found.products, vec![line(3, 4, 100)]);
    assert_eq!(found.order_sum, Money::from_cents(400));
    assert!(found.updated_at.is_some());
}

#[tokio::test]
#[serial]
async fn dropped_lock_rolls_back() {
    let repo = get_test_repo().await;
    let order = repo
        .insert(NewOrder::new(details(), vec![line(1, 1, 1000)]).unwrap())
        .await
        .unwrap();

    {
        let mut locked = repo.begin_locked(order.id).await.unwrap();
        locked.order_mut().set_status(OrderStatus::Created).unwrap();
    }

    let found = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(found.status, OrderStatus::New);
}

#[tokio::test]
#[serial]
async fn second_locker_waits_for_first() {
    let repo = get_test_repo().await;
    let order = repo
        .insert(NewOrder::new(details(), vec![line(1, 1, 1000)]).unwrap())
        .await
        .unwrap();

    let mut first = repo.begin_locked(order.id).await.unwrap();

    let contender = repo.clone();
    let id = order.id;
    let handle = tokio::spawn(async move {
        let locked = contender.begin_locked(id).await;
        locked.map(|l| l.order().status)
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!handle.is_finished());

    first.order_mut().set_status(OrderStatus::Created).unwrap();
    first.commit().await.unwrap();

    // The second transaction sees the row after the first commit or fails
    // with a serialization conflict under REPEATABLE READ.
    match handle.await.unwrap() {
        Ok(status) => assert_eq!(status, OrderStatus::Created),
        Err(RepositoryError::Conflict(conflicted)) => assert_eq!(conflicted, id),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[tokio::test]
#[serial]
async fn delete_removes_order_and_products() {
    let repo = get_test_repo().await;
    let order = repo
        .insert(NewOrder::new(details(), vec![line(1, 1, 1000)]).unwrap())
        .await
        .unwrap();

    let locked = repo.begin_locked(order.id).await.unwrap();
    locked.delete().await.unwrap();

    assert!(repo.find(order.id).await.unwrap().is_none());
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_products")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
#[serial]
async fn composition_updates_against_postgres() {
    let repo = get_test_repo().await;
    let order = repo
        .insert(NewOrder::new(details(), vec![line(1, 1, 1000)]).unwrap())
        .await
        .unwrap();
    let service = OrderCompositionService::new(Arc::new(repo.clone()));

    let cmd = SetOrderComposition::new(order.id)
        .with_products(vec![line(1, 3, 1000), line(2, 1, 50)])
        .with_status(OrderStatus::Created);
    service.set_order_composition(cmd.clone()).await.unwrap();
    service.set_order_composition(cmd).await.unwrap();

    let found = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(found.status, OrderStatus::Created);
    assert_eq!(found.products.len(), 2);
    assert_eq!(found.order_sum, Money::from_cents(3050));

    let result = service
        .set_order_composition(SetOrderComposition::new(order.id).with_status(OrderStatus::New))
        .await;
    assert!(matches!(
        result,
        Err(DomainError::Order(OrderError::CantSetStatus { .. }))
    ));
}
