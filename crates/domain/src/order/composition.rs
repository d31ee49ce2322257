//! Row-locked composition updates reported by the reservation saga.

use std::sync::Arc;

use crate::error::DomainError;

use super::{Order, OrderError, OrderProduct, OrderRepository, OrderStatus, SetOrderComposition};

/// Applies composition and status changes to an order inside one row-locked
/// transaction.
///
/// Applying the same change twice leaves the order as applying it once: an
/// already reached status is not re-applied and products are replaced, never
/// appended.
#[derive(Clone)]
pub struct OrderCompositionService {
    repo: Arc<dyn OrderRepository>,
}

impl OrderCompositionService {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self { repo }
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, status = ?cmd.status))]
    pub async fn set_order_composition(
        &self,
        cmd: SetOrderComposition,
    ) -> Result<Order, DomainError> {
        if cmd.products.is_none() && cmd.status.is_none() {
            return Err(OrderError::EmptyComposition.into());
        }

        let mut locked = self.repo.begin_locked(cmd.order_id).await?;
        let order = locked.order_mut();

        // A finished order may still be canceled; nothing else touches a closed order.
        let cancels_finished =
            order.status == OrderStatus::Finished && cmd.status == Some(OrderStatus::Canceled);
        if order.status.is_closed() && !cancels_finished {
            return Err(OrderError::OrderClosed {
                status: order.status,
            }
            .into());
        }

        if let Some(status) = cmd.status
            && status != order.status
        {
            order.set_status(status)?;
        }

        if let Some(products) = cmd.products
            && order.status != OrderStatus::Canceled
        {
            let products = products
                .into_iter()
                .map(|p| OrderProduct::new(p.product_id, p.quantity, p.price))
                .collect::<Result<Vec<_>, _>>()?;
            order.replace_products(products)?;
        }

        let updated = order.clone();
        locked.commit().await?;

        metrics::counter!("order_composition_updates_total").increment(1);
        tracing::info!(status = %updated.status, sum = %updated.order_sum, "order composition applied");

        Ok(updated)
    }
}
