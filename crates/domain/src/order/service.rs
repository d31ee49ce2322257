//! Order use cases.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use common::{AppError, ErrorKind, OrderId, ProductId};
use uuid::Uuid;

use crate::error::DomainError;

use super::{
    CatalogProduct, CompositionChange, CreateOrder, NewOrder, Order, OrderError, OrderLineRequest,
    OrderProduct, OrderRepository, OrderStatus, ProductCatalog, ReservationSaga, UpdateOrder,
    order_sum,
};

/// Service for managing orders.
///
/// Product reservations go through the [`ReservationSaga`]; the order row
/// itself is only changed here for client details, removal and archiving.
#[derive(Clone)]
pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    catalog: Arc<dyn ProductCatalog>,
    saga: Arc<dyn ReservationSaga>,
}

impl OrderService {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        catalog: Arc<dyn ProductCatalog>,
        saga: Arc<dyn ReservationSaga>,
    ) -> Self {
        Self {
            repo,
            catalog,
            saga,
        }
    }

    /// Creates an order and blocks until its products are reserved.
    ///
    /// The order is stored in `New` first; the saga moves it to `Created`.
    /// If the saga definitely failed the `New` order is removed again.
    #[tracing::instrument(skip(self, cmd), fields(lines = cmd.products.len()))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        let catalog = self.fetch_catalog(&cmd.products).await?;
        let lines = resolve_lines(&cmd.products, &catalog, true)?;

        let order = self
            .repo
            .insert(NewOrder::new(cmd.details, lines.clone())?)
            .await?;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, sum = %order.order_sum, "order stored, reserving products");

        if let Err(err) = self.saga.reserve_products(order.id, lines).await {
            return Err(self.reservation_failed(order.id, err).await);
        }

        self.get_order(order.id).await
    }

    /// Replaces an order's products (through the saga) and client details.
    #[tracing::instrument(skip(self, cmd), fields(lines = cmd.products.len()))]
    pub async fn update_order(&self, id: OrderId, cmd: UpdateOrder) -> Result<Order, DomainError> {
        let catalog = self.fetch_catalog(&cmd.products).await?;
        let lines = resolve_lines(&cmd.products, &catalog, false)?;

        let order = self.get_order(id).await?;
        if order.status.is_closed() {
            return Err(OrderError::OrderClosed {
                status: order.status,
            }
            .into());
        }

        let change = CompositionChange {
            products: Some(lines),
            status: None,
        };
        self.saga
            .update_composition(id, change, false)
            .await
            .map_err(map_reservation_error)?;

        let mut locked = self.repo.begin_locked(id).await?;
        locked.order_mut().details = cmd.details;
        let updated = locked.order().clone();
        locked.commit().await?;

        Ok(updated)
    }

    /// Requests a status change without waiting for the saga to finish.
    ///
    /// Canceling also releases the order's reserved products.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<(), DomainError> {
        let mut order = self.get_order(id).await?;

        if status == OrderStatus::New {
            return Err(OrderError::CantSetStatus {
                from: order.status,
                to: status,
            }
            .into());
        }
        if order.status == status {
            return Ok(());
        }
        order.set_status(status)?;

        let change = CompositionChange {
            products: (status == OrderStatus::Canceled).then(Vec::new),
            status: Some(status),
        };
        self.saga.update_composition(id, change, true).await?;

        tracing::info!(order_id = %id, %status, "status change accepted");
        Ok(())
    }

    /// Hard-deletes an order that never left `New`.
    #[tracing::instrument(skip(self))]
    pub async fn remove_order_if_new(&self, id: OrderId) -> Result<(), DomainError> {
        let locked = self.repo.begin_locked(id).await?;
        let status = locked.order().status;
        if status != OrderStatus::New {
            return Err(OrderError::NotNew { status }.into());
        }
        locked.delete().await?;
        Ok(())
    }

    /// Soft-deletes a finished or canceled order.
    #[tracing::instrument(skip(self))]
    pub async fn archive_order(&self, id: OrderId) -> Result<(), DomainError> {
        let mut locked = self.repo.begin_locked(id).await?;
        let status = locked.order().status;
        if !status.is_closed() {
            return Err(OrderError::NotFinalized { status }.into());
        }
        locked.order_mut().deleted_at = Some(Utc::now());
        locked.commit().await?;
        Ok(())
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order, DomainError> {
        self.repo
            .find(id)
            .await?
            .ok_or_else(|| OrderError::NotFound(id).into())
    }

    /// Loads an order for an anonymous client holding its secret key.
    #[tracing::instrument(skip(self, secret_key))]
    pub async fn get_order_by_secret_key(
        &self,
        id: OrderId,
        secret_key: Uuid,
    ) -> Result<Order, DomainError> {
        let order = self.get_order(id).await?;
        if order.secret_key != secret_key {
            return Err(OrderError::NotFound(id).into());
        }
        Ok(order)
    }

    async fn fetch_catalog(
        &self,
        lines: &[OrderLineRequest],
    ) -> Result<Vec<CatalogProduct>, DomainError> {
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let unique: HashSet<ProductId> = ids.iter().copied().collect();
        if ids.is_empty() || unique.len() != ids.len() {
            return Err(OrderError::InvalidProducts.into());
        }

        let products = self.catalog.get_products_by_ids(&ids).await?;
        if products.len() != ids.len() {
            return Err(OrderError::InvalidProducts.into());
        }
        Ok(products)
    }

    async fn reservation_failed(&self, id: OrderId, err: AppError) -> DomainError {
        // On a caller-side timeout the saga may still reserve; keep the order.
        if err.kind() != ErrorKind::ServiceUnavailable
            && let Err(remove_err) = self.remove_order_if_new(id).await
        {
            tracing::warn!(order_id = %id, error = %remove_err, "failed to remove unreserved order");
        }
        map_reservation_error(err)
    }
}

/// A refused reservation becomes "invalid products quantity"; anything else passes through.
fn map_reservation_error(err: AppError) -> DomainError {
    if err.kind() == ErrorKind::Conflict {
        return OrderError::InsufficientStock {
            details: err.details().to_vec(),
        }
        .into();
    }
    DomainError::Upstream(err)
}

/// Prices requested lines from the catalog, optionally checking stock.
fn resolve_lines(
    lines: &[OrderLineRequest],
    catalog: &[CatalogProduct],
    check_stock: bool,
) -> Result<Vec<OrderProduct>, OrderError> {
    let mut short = Vec::new();
    let mut resolved = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity < 1 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
            });
        }

        let product = catalog
            .iter()
            .find(|p| p.id == line.product_id)
            .filter(|p| p.is_published)
            .ok_or(OrderError::InvalidProducts)?;

        if check_stock && product.stock_available < line.quantity {
            short.push(format!(
                "available stock for product \"{}\": {} pcs",
                product.name, product.stock_available
            ));
        }

        resolved.push(OrderProduct::new(
            line.product_id,
            line.quantity,
            product.price,
        )?);
    }

    if !short.is_empty() {
        return Err(OrderError::InsufficientStock { details: short });
    }
    order_sum(&resolved)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::order::{ClientDetails, InMemoryOrderRepository, Money};

    struct FixedCatalog(Vec<CatalogProduct>);

    #[async_trait]
    impl ProductCatalog for FixedCatalog {
        async fn get_products_by_ids(
            &self,
            ids: &[ProductId],
        ) -> Result<Vec<CatalogProduct>, AppError> {
            Ok(self
                .0
                .iter()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        }
    }

    /// Records saga calls and answers with a canned result.
    #[derive(Default)]
    struct RecordingSaga {
        calls: Mutex<Vec<(OrderId, CompositionChange, bool)>>,
        fail_with: Mutex<Option<AppError>>,
    }

    impl RecordingSaga {
        fn calls(&self) -> Vec<(OrderId, CompositionChange, bool)> {
            self.calls.lock().unwrap().clone()
        }

        fn fail_with(&self, err: AppError) {
            *self.fail_with.lock().unwrap() = Some(err);
        }

        fn respond(&self) -> Result<(), AppError> {
            match self.fail_with.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ReservationSaga for RecordingSaga {
        async fn reserve_products(
            &self,
            order_id: OrderId,
            products: Vec<OrderProduct>,
        ) -> Result<(), AppError> {
            let change = CompositionChange {
                products: Some(products),
                status: Some(OrderStatus::Created),
            };
            self.calls.lock().unwrap().push((order_id, change, false));
            self.respond()
        }

        async fn update_composition(
            &self,
            order_id: OrderId,
            change: CompositionChange,
            not_wait: bool,
        ) -> Result<(), AppError> {
            self.calls.lock().unwrap().push((order_id, change, not_wait));
            self.respond()
        }
    }

    fn product(id: i64, cents: i64, stock: u32) -> CatalogProduct {
        CatalogProduct {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Money::from_cents(cents),
            stock_available: stock,
            is_published: true,
        }
    }

    fn setup(
        products: Vec<CatalogProduct>,
    ) -> (OrderService, InMemoryOrderRepository, Arc<RecordingSaga>) {
        let repo = InMemoryOrderRepository::new();
        let saga = Arc::new(RecordingSaga::default());
        let service = OrderService::new(
            Arc::new(repo.clone()),
            Arc::new(FixedCatalog(products)),
            saga.clone(),
        );
        (service, repo, saga)
    }

    fn create_cmd(lines: Vec<OrderLineRequest>) -> CreateOrder {
        CreateOrder::new(ClientDetails::default(), lines)
    }

    #[tokio::test]
    async fn create_order_prices_lines_and_starts_saga() {
        let (service, _, saga) = setup(vec![product(1, 1000, 5)]);

        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 2)]))
            .await
            .unwrap();

        assert_eq!(order.order_sum.to_string(), "20.00");
        let calls = saga.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, order.id);
        assert_eq!(calls[0].1.status, Some(OrderStatus::Created));
    }

    #[tokio::test]
    async fn create_order_rejects_duplicate_or_empty_products() {
        let (service, _, saga) = setup(vec![product(1, 1000, 5)]);

        for lines in [
            vec![],
            vec![OrderLineRequest::new(1, 1), OrderLineRequest::new(1, 2)],
            vec![OrderLineRequest::new(2, 1)],
        ] {
            let result = service.create_order(create_cmd(lines)).await;
            assert!(matches!(
                result,
                Err(DomainError::Order(OrderError::InvalidProducts))
            ));
        }
        assert!(saga.calls().is_empty());
    }

    #[tokio::test]
    async fn create_order_prechecks_stock() {
        let (service, repo, saga) = setup(vec![product(1, 1000, 1), product(2, 100, 0)]);

        let result = service
            .create_order(create_cmd(vec![
                OrderLineRequest::new(1, 2),
                OrderLineRequest::new(2, 1),
            ]))
            .await;

        match result {
            Err(DomainError::Order(OrderError::InsufficientStock { details })) => {
                assert_eq!(details.len(), 2)
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(saga.calls().is_empty());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn create_order_rejects_amounts_that_do_not_fit() {
        let (service, repo, saga) = setup(vec![product(1, i64::MAX, 5)]);

        let result = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 2)]))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::AmountOverflow))
        ));
        assert!(saga.calls().is_empty());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn refused_reservation_removes_new_order() {
        let (service, repo, saga) = setup(vec![product(1, 1000, 5)]);
        saga.fail_with(AppError::conflict("can't reserve product"));

        let result = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 2)]))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InsufficientStock { .. }))
        ));
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn wait_timeout_keeps_order() {
        let (service, repo, saga) = setup(vec![product(1, 1000, 5)]);
        saga.fail_with(AppError::service_unavailable("saga still running"));

        let result = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 2)]))
            .await;

        match result {
            Err(DomainError::Upstream(err)) => assert_eq!(err.kind(), ErrorKind::ServiceUnavailable),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn set_status_new_is_rejected() {
        let (service, _, saga) = setup(vec![product(1, 1000, 5)]);
        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 1)]))
            .await
            .unwrap();

        let result = service.set_status(order.id, OrderStatus::New).await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::CantSetStatus { .. }))
        ));
        assert_eq!(saga.calls().len(), 1);
    }

    #[tokio::test]
    async fn set_status_same_status_is_noop() {
        let (service, repo, saga) = setup(vec![product(1, 1000, 5)]);
        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 1)]))
            .await
            .unwrap();

        let mut locked = repo.begin_locked(order.id).await.unwrap();
        locked.order_mut().status = OrderStatus::Created;
        locked.commit().await.unwrap();

        service
            .set_status(order.id, OrderStatus::Created)
            .await
            .unwrap();
        assert_eq!(saga.calls().len(), 1);
    }

    #[tokio::test]
    async fn set_status_does_not_wait_and_cancel_clears_products() {
        let (service, repo, saga) = setup(vec![product(1, 1000, 5)]);
        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 1)]))
            .await
            .unwrap();

        service
            .set_status(order.id, OrderStatus::Created)
            .await
            .unwrap();

        let mut locked = repo.begin_locked(order.id).await.unwrap();
        locked.order_mut().status = OrderStatus::Finished;
        locked.commit().await.unwrap();

        service
            .set_status(order.id, OrderStatus::Canceled)
            .await
            .unwrap();

        let calls = saga.calls();
        assert_eq!(calls.len(), 3);

        let (_, change, not_wait) = &calls[1];
        assert_eq!(change.status, Some(OrderStatus::Created));
        assert!(change.products.is_none());
        assert!(*not_wait);

        let (_, change, not_wait) = &calls[2];
        assert_eq!(change.status, Some(OrderStatus::Canceled));
        assert_eq!(change.products, Some(Vec::new()));
        assert!(*not_wait);
    }

    #[tokio::test]
    async fn set_status_validates_transition() {
        let (service, _, saga) = setup(vec![product(1, 1000, 5)]);
        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 1)]))
            .await
            .unwrap();

        let result = service.set_status(order.id, OrderStatus::Finished).await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::CantSetStatus {
                from: OrderStatus::New,
                to: OrderStatus::Finished
            }))
        ));
        assert_eq!(saga.calls().len(), 1);
    }

    #[tokio::test]
    async fn remove_order_if_new_only_removes_new_orders() {
        let (service, repo, _) = setup(vec![product(1, 1000, 5)]);
        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 1)]))
            .await
            .unwrap();

        let mut locked = repo.begin_locked(order.id).await.unwrap();
        locked.order_mut().status = OrderStatus::Created;
        locked.commit().await.unwrap();

        let result = service.remove_order_if_new(order.id).await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::NotNew { .. }))
        ));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn archive_requires_closed_order() {
        let (service, repo, _) = setup(vec![product(1, 1000, 5)]);
        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 1)]))
            .await
            .unwrap();

        assert!(matches!(
            service.archive_order(order.id).await,
            Err(DomainError::Order(OrderError::NotFinalized { .. }))
        ));

        let mut locked = repo.begin_locked(order.id).await.unwrap();
        locked.order_mut().status = OrderStatus::Canceled;
        locked.commit().await.unwrap();

        service.archive_order(order.id).await.unwrap();
        assert!(matches!(
            service.get_order(order.id).await,
            Err(DomainError::Order(OrderError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn secret_key_must_match() {
        let (service, _, _) = setup(vec![product(1, 1000, 5)]);
        let order = service
            .create_order(create_cmd(vec![OrderLineRequest::new(1, 1)]))
            .await
            .unwrap();

        assert!(
            service
                .get_order_by_secret_key(order.id, order.secret_key)
                .await
                .is_ok()
        );
        assert!(
            service
                .get_order_by_secret_key(order.id, Uuid::new_v4())
                .await
                .is_err()
        );
    }
}
