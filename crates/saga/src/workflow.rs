//! The order products saga.
//!
//! Reserves an order's products in the catalog and reports the resulting
//! composition or status to the orders service. When the reservation
//! outcome is ambiguous (timeout or 5xx), or the orders service rejects
//! the report, the previous blocked-product snapshot is restored.

use async_trait::async_trait;
use common::OrderId;

use crate::activities::{
    ActivityRequest, BlockedProduct, OrderProductsActivities, SetOrderCompositionRequest,
};
use crate::bridge::from_transport_error;
use crate::error::WorkflowError;
use crate::order_products::{
    SagaInput, SagaResult, WORKFLOW_TYPE, codes, limited_options, unlimited_options,
};
use crate::runtime::{ActivityFailure, Workflow, WorkflowContext};
use crate::state::SagaState;

type Ctx = WorkflowContext<OrderProductsActivities>;

/// The saga workflow definition. Stateless; each run gets its own context.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderProductsWorkflow;

/// Returns true when the remote side may or may not have applied the call.
pub fn is_ambiguous(failure: &ActivityFailure) -> bool {
    failure.is_timeout() || from_transport_error(failure).is_some_and(|e| e.is_server_error())
}

/// Tracks the current state of one run for logging.
struct Progress {
    order_id: OrderId,
    state: SagaState,
}

impl Progress {
    fn advance(&mut self, next: SagaState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{} -> {next}",
            self.state
        );
        tracing::debug!(order_id = %self.order_id, from = %self.state, to = %next, "saga state");
        self.state = next;
    }

    fn finish(mut self, next: SagaState, result: SagaResult) -> SagaResult {
        self.advance(next);
        metrics::counter!("saga_completed_total", "outcome" => next.as_str()).increment(1);
        tracing::info!(order_id = %self.order_id, state = %next, error_code = result.error_code, "saga finished");
        result
    }
}

#[async_trait]
impl Workflow for OrderProductsWorkflow {
    const NAME: &'static str = WORKFLOW_TYPE;

    type Input = SagaInput;
    type Output = SagaResult;
    type Activities = OrderProductsActivities;

    async fn run(&self, ctx: &mut Ctx, input: SagaInput) -> Result<SagaResult, WorkflowError> {
        let order_id = input.order_id;
        if input.is_empty() {
            tracing::warn!(%order_id, "saga started without products or status");
            return Ok(SagaResult::failure(codes::EMPTY_REQUEST));
        }

        let mut progress = Progress {
            order_id,
            state: SagaState::Started,
        };
        let limited = limited_options();
        let unlimited = unlimited_options();

        // Compensation target; only read when products change.
        let mut snapshot: Option<Vec<BlockedProduct>> = None;

        if let Some(products) = &input.order_products {
            progress.advance(SagaState::ReadingSnapshot);
            let current = ctx
                .execute_activity::<Vec<BlockedProduct>>(
                    &limited,
                    ActivityRequest::GetOrderBlockedProducts { order_id },
                )
                .await?;

            let current = match current {
                Ok(current) => current,
                Err(failure) => {
                    tracing::warn!(%order_id, error = %failure, "cannot read blocked products snapshot");
                    inform_failure(ctx, order_id).await?;
                    return Ok(progress.finish(
                        SagaState::FailedReservation,
                        SagaResult::failure(codes::UNSPECIFIED),
                    ));
                }
            };
            snapshot = Some(current.clone());

            progress.advance(SagaState::Reserving);
            let reserved = ctx
                .execute_activity::<()>(
                    &limited,
                    ActivityRequest::SetOrderBlockedProducts {
                        order_id,
                        products: products.iter().map(BlockedProduct::from).collect(),
                    },
                )
                .await?;

            if let Err(failure) = reserved {
                let end = if is_ambiguous(&failure) {
                    tracing::warn!(%order_id, error = %failure, "reservation outcome unknown, restoring snapshot");
                    progress.advance(SagaState::FailedAmbiguous);
                    progress.advance(SagaState::Compensating);
                    compensate(ctx, order_id, current).await?;
                    SagaState::FailedAfterCompensation
                } else {
                    tracing::info!(%order_id, error = %failure, "reservation refused");
                    SagaState::FailedReservation
                };

                inform_failure(ctx, order_id).await?;
                return Ok(progress.finish(end, SagaResult::failure(codes::CANT_RESERVE)));
            }
        }

        progress.advance(SagaState::Informing);
        let informed = ctx
            .execute_activity::<()>(
                &unlimited,
                ActivityRequest::InformOrderComposition(SetOrderCompositionRequest {
                    order_id,
                    is_ok: true,
                    products: input.order_products.clone(),
                    status: input.order_status,
                }),
            )
            .await?;

        if let Err(failure) = informed {
            tracing::warn!(%order_id, error = %failure, "orders service rejected the composition");
            let end = match snapshot {
                Some(snapshot) => {
                    progress.advance(SagaState::FailedAmbiguous);
                    progress.advance(SagaState::Compensating);
                    compensate(ctx, order_id, snapshot).await?;
                    SagaState::FailedAfterCompensation
                }
                None => SagaState::FailedReservation,
            };

            inform_failure(ctx, order_id).await?;
            return Ok(progress.finish(end, SagaResult::failure(codes::UNSPECIFIED)));
        }

        Ok(progress.finish(SagaState::Succeeded, SagaResult::success()))
    }
}

/// Restores the blocked-product snapshot, retrying without limit.
async fn compensate(
    ctx: &mut Ctx,
    order_id: OrderId,
    snapshot: Vec<BlockedProduct>,
) -> Result<(), WorkflowError> {
    metrics::counter!("saga_compensations_total").increment(1);

    let restored = ctx
        .execute_activity::<()>(
            &unlimited_options(),
            ActivityRequest::SetOrderBlockedProducts {
                order_id,
                products: snapshot,
            },
        )
        .await?;

    if let Err(failure) = restored {
        tracing::error!(%order_id, error = %failure, "compensation rejected, blocked products may have drifted");
    }
    Ok(())
}

/// Tells the orders service the saga failed. Best effort.
async fn inform_failure(ctx: &mut Ctx, order_id: OrderId) -> Result<(), WorkflowError> {
    let informed = ctx
        .execute_activity::<()>(
            &unlimited_options(),
            ActivityRequest::InformOrderComposition(SetOrderCompositionRequest::failed(order_id)),
        )
        .await?;

    if let Err(failure) = informed {
        tracing::warn!(%order_id, error = %failure, "failed to report saga failure");
    }
    Ok(())
}
