//! Orders-service side of the composition report.

use async_trait::async_trait;
use common::AppError;
use domain::{OrderCompositionService, SetOrderComposition};

use crate::activities::{OrdersClient, SetOrderCompositionRequest};

/// [`OrdersClient`] that applies reports in-process through the order
/// composition service.
#[derive(Clone)]
pub struct OrderServiceClient {
    composition: OrderCompositionService,
}

impl OrderServiceClient {
    pub fn new(composition: OrderCompositionService) -> Self {
        Self { composition }
    }
}

#[async_trait]
impl OrdersClient for OrderServiceClient {
    async fn set_order_composition(
        &self,
        request: SetOrderCompositionRequest,
    ) -> Result<(), AppError> {
        if !request.is_ok {
            // The saga failed; the order keeps its current composition.
            tracing::warn!(order_id = %request.order_id, "order products saga reported a failure");
            return Ok(());
        }

        let mut cmd = SetOrderComposition::new(request.order_id);
        if let Some(products) = request.products {
            cmd = cmd.with_products(products);
        }
        if let Some(status) = request.status {
            cmd = cmd.with_status(status);
        }

        self.composition
            .set_order_composition(cmd)
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }
}
