use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use super::{
    ClientDetails, LockedOrder, Money, NewOrder, Order, OrderProduct, OrderRepository,
    OrderStatus, RepositoryError,
};

const ORDER_COLUMNS: &str = "id, status, order_sum, secret_key, client_name, client_surname, \
     client_email, client_phone, delivery_address, created_at, updated_at, deleted_at";

/// PostgreSQL-backed order repository.
///
/// Locked transactions run under `REPEATABLE READ` and hold the order row
/// with `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps serialization failures and deadlocks to `Conflict`.
fn map_db_error(id: OrderId, e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    {
        return RepositoryError::Conflict(id);
    }
    RepositoryError::Database(e)
}

fn order_from_row(row: &PgRow, products: Vec<OrderProduct>) -> Result<Order, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        status,
        order_sum: Money::from_cents(row.try_get("order_sum")?),
        secret_key: row.try_get::<Uuid, _>("secret_key")?,
        details: ClientDetails {
            client_name: row.try_get("client_name")?,
            client_surname: row.try_get("client_surname")?,
            client_email: row.try_get("client_email")?,
            client_phone: row.try_get("client_phone")?,
            delivery_address: row.try_get("delivery_address")?,
        },
        products,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<OrderProduct, RepositoryError> {
    let quantity: i32 = row.try_get("quantity")?;
    Ok(OrderProduct {
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Corrupt(format!("negative quantity {quantity}")))?,
        price: Money::from_cents(row.try_get("price")?),
    })
}

async fn load_products(
    conn: &mut sqlx::PgConnection,
    id: OrderId,
) -> Result<Vec<OrderProduct>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT product_id, quantity, price FROM order_products WHERE order_id = $1 ORDER BY created_at, product_id",
    )
    .bind(id.as_i64())
    .fetch_all(conn)
    .await?;

    rows.iter().map(product_from_row).collect()
}

async fn insert_products(
    conn: &mut sqlx::PgConnection,
    id: OrderId,
    products: &[OrderProduct],
) -> Result<(), RepositoryError> {
    for product in products {
        let quantity = i32::try_from(product.quantity)
            .map_err(|_| RepositoryError::Corrupt(format!("quantity {} overflows", product.quantity)))?;
        sqlx::query(
            "INSERT INTO order_products (order_id, product_id, quantity, price) VALUES ($1, $2, $3, $4)",
        )
        .bind(id.as_i64())
        .bind(product.product_id.as_i64())
        .bind(quantity)
        .bind(product.price.cents())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (status, order_sum, secret_key, client_name, client_surname,
                                client_email, client_phone, delivery_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, created_at
            "#,
        )
        .bind(OrderStatus::New.as_str())
        .bind(order.order_sum.cents())
        .bind(order.secret_key)
        .bind(&order.details.client_name)
        .bind(&order.details.client_surname)
        .bind(&order.details.client_email)
        .bind(&order.details.client_phone)
        .bind(&order.details.delivery_address)
        .fetch_one(&mut *tx)
        .await?;

        let id = OrderId::new(row.try_get("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        insert_products(&mut *tx, id, &order.products).await?;
        tx.commit().await?;

        Ok(order.into_order(id, created_at))
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let products = load_products(&mut *conn, id).await?;
                Ok(Some(order_from_row(&row, products)?))
            }
            None => Ok(None),
        }
    }

    async fn begin_locked(&self, id: OrderId) -> Result<Box<dyn LockedOrder>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_error(id, e))?
        .ok_or(RepositoryError::NotFound(id))?;

        let products = load_products(&mut *tx, id).await?;
        let order = order_from_row(&row, products)?;

        Ok(Box::new(PostgresLockedOrder { tx, order }))
    }
}

struct PostgresLockedOrder {
    tx: Transaction<'static, Postgres>,
    order: Order,
}

#[async_trait]
impl LockedOrder for PostgresLockedOrder {
    fn order(&self) -> &Order {
        &self.order
    }

    fn order_mut(&mut self) -> &mut Order {
        &mut self.order
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let PostgresLockedOrder { mut tx, order } = *self;
        let id = order.id;

        sqlx::query(
            r#"
            UPDATE orders SET
                status = $2,
                order_sum = $3,
                client_name = $4,
                client_surname = $5,
                client_email = $6,
                client_phone = $7,
                delivery_address = $8,
                deleted_at = $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(order.status.as_str())
        .bind(order.order_sum.cents())
        .bind(&order.details.client_name)
        .bind(&order.details.client_surname)
        .bind(&order.details.client_email)
        .bind(&order.details.client_phone)
        .bind(&order.details.delivery_address)
        .bind(order.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(id, e))?;

        sqlx::query("DELETE FROM order_products WHERE order_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(id, e))?;

        insert_products(&mut *tx, id, &order.products).await?;

        tx.commit().await.map_err(|e| map_db_error(id, e))
    }

    async fn delete(self: Box<Self>) -> Result<(), RepositoryError> {
        let PostgresLockedOrder { mut tx, order } = *self;

        // Product lines go with the order row (ON DELETE CASCADE).
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order.id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(order.id, e))?;

        tx.commit().await.map_err(|e| map_db_error(order.id, e))
    }
}
