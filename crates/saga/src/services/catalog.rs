//! In-memory products catalog with per-order blocked products.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, ErrorKind, OrderId, ProductId};
use domain::{CatalogProduct, Money, ProductCatalog};
use tokio::sync::RwLock;

use crate::activities::{BlockedProduct, ProductsClient};

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    price: Money,
    stock: u32,
    is_published: bool,
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, CatalogEntry>,
    blocked: HashMap<OrderId, Vec<BlockedProduct>>,
}

impl CatalogState {
    /// Quantity of `product_id` blocked by orders other than `except`.
    fn blocked_quantity(&self, product_id: ProductId, except: Option<OrderId>) -> u32 {
        self.blocked
            .iter()
            .filter(|(order_id, _)| Some(**order_id) != except)
            .flat_map(|(_, items)| items.iter())
            .filter(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .sum()
    }
}

/// Products catalog holding stock and blocked products in memory.
///
/// Blocked products are replaced per order under a single write lock, so a
/// concurrent reader never observes a half-applied reservation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a published product.
    pub async fn add_product(
        &self,
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        stock: u32,
    ) {
        self.state.write().await.products.insert(
            id.into(),
            CatalogEntry {
                name: name.into(),
                price,
                stock,
                is_published: true,
            },
        );
    }

    pub async fn set_published(&self, id: ProductId, is_published: bool) {
        if let Some(entry) = self.state.write().await.products.get_mut(&id) {
            entry.is_published = is_published;
        }
    }

    /// Stock not blocked by any order.
    pub async fn available(&self, id: ProductId) -> u32 {
        let state = self.state.read().await;
        state
            .products
            .get(&id)
            .map(|p| p.stock.saturating_sub(state.blocked_quantity(id, None)))
            .unwrap_or(0)
    }

    pub async fn blocked_for(&self, order_id: OrderId) -> Vec<BlockedProduct> {
        self.state
            .read()
            .await
            .blocked
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProductsClient for InMemoryCatalog {
    async fn get_order_blocked_products(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<BlockedProduct>, AppError> {
        Ok(self.blocked_for(order_id).await)
    }

    #[tracing::instrument(skip(self, products), fields(count = products.len()))]
    async fn set_order_blocked_products(
        &self,
        order_id: OrderId,
        products: Vec<BlockedProduct>,
    ) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for item in &products {
            if item.quantity < 1 {
                return Err(AppError::bad_request(format!(
                    "invalid quantity in #{} product",
                    item.product_id
                )));
            }
            if !seen.insert(item.product_id) {
                return Err(AppError::bad_request("duplicate products"));
            }
        }

        let mut state = self.state.write().await;

        let mut short = Vec::new();
        for item in &products {
            let entry = state.products.get(&item.product_id).ok_or_else(|| {
                AppError::new(ErrorKind::NotFound)
                    .with_message("product not found")
                    .with_detail(format!("product #{}", item.product_id))
            })?;

            let available = entry
                .stock
                .saturating_sub(state.blocked_quantity(item.product_id, Some(order_id)));
            if available < item.quantity {
                short.push(format!(
                    "available stock for product \"{}\": {} pcs",
                    entry.name, available
                ));
            }
        }

        if !short.is_empty() {
            return Err(AppError::bad_request("can't reserve product").with_details(short));
        }

        if products.is_empty() {
            state.blocked.remove(&order_id);
        } else {
            state.blocked.insert(order_id, products);
        }
        tracing::debug!(%order_id, "blocked products replaced");
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get_products_by_ids(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, AppError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state.products.get(id).map(|entry| CatalogProduct {
                    id: *id,
                    name: entry.name.clone(),
                    price: entry.price,
                    stock_available: entry.stock.saturating_sub(state.blocked_quantity(*id, None)),
                    is_published: entry.is_published,
                })
            })
            .collect())
    }
}
