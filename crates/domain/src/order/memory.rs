use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{LockedOrder, NewOrder, Order, OrderRepository, RepositoryError};

/// A row slot; `None` once the order has been hard-deleted.
type Row = Arc<Mutex<Option<Order>>>;

/// In-memory order repository.
///
/// Every order lives behind its own mutex, which plays the part of the
/// database row lock.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    rows: Arc<RwLock<HashMap<OrderId, Row>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders, soft-deleted ones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn row(&self, id: OrderId) -> Option<Row> {
        self.rows.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let id = OrderId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let order = order.into_order(id, Utc::now());

        self.rows
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(Some(order.clone()))));

        Ok(order)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let Some(row) = self.row(id).await else {
            return Ok(None);
        };
        let slot = row.lock().await;
        Ok(slot.as_ref().filter(|order| !order.is_deleted()).cloned())
    }

    async fn begin_locked(&self, id: OrderId) -> Result<Box<dyn LockedOrder>, RepositoryError> {
        let row = self.row(id).await.ok_or(RepositoryError::NotFound(id))?;
        let guard = row.lock_owned().await;

        let order = guard
            .as_ref()
            .filter(|order| !order.is_deleted())
            .cloned()
            .ok_or(RepositoryError::NotFound(id))?;

        Ok(Box::new(InMemoryLockedOrder {
            guard,
            order,
            rows: Arc::clone(&self.rows),
        }))
    }
}

struct InMemoryLockedOrder {
    guard: OwnedMutexGuard<Option<Order>>,
    /// Working copy; written back to the slot on commit.
    order: Order,
    rows: Arc<RwLock<HashMap<OrderId, Row>>>,
}

#[async_trait]
impl LockedOrder for InMemoryLockedOrder {
    fn order(&self) -> &Order {
        &self.order
    }

    fn order_mut(&mut self) -> &mut Order {
        &mut self.order
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut this = *self;
        this.order.updated_at = Some(Utc::now());
        *this.guard = Some(this.order);
        Ok(())
    }

    async fn delete(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut this = *self;
        let id = this.order.id;
        *this.guard = None;
        drop(this.guard);
        this.rows.write().await.remove(&id);
        Ok(())
    }
}
