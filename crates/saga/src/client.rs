//! Client façade used by the orders service to run the saga.

use std::time::Duration;

use async_trait::async_trait;
use common::{AppError, OrderId};
use domain::{CompositionChange, OrderProduct, OrderStatus, ReservationSaga};

use crate::error::{Result, SagaError, WorkflowError};
use crate::order_products::{SagaInput, SagaResult, TASK_QUEUE, codes, workflow_id};
use crate::runtime::{IdConflictPolicy, StartWorkflowOptions, WorkflowEngine, WorkflowHandle};
use crate::workflow::OrderProductsWorkflow;

/// Default time a caller waits for the saga outcome.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Starts order products sagas and translates their result codes.
#[derive(Clone)]
pub struct SagaClient {
    engine: WorkflowEngine<OrderProductsWorkflow>,
    task_queue: String,
    wait_timeout: Duration,
    id_conflict: IdConflictPolicy,
}

impl SagaClient {
    pub fn new(engine: WorkflowEngine<OrderProductsWorkflow>) -> Self {
        Self {
            engine,
            task_queue: TASK_QUEUE.to_string(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            id_conflict: IdConflictPolicy::default(),
        }
    }

    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = task_queue.into();
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_id_conflict(mut self, policy: IdConflictPolicy) -> Self {
        self.id_conflict = policy;
        self
    }

    /// Runs the saga for `input`.
    ///
    /// With `not_wait` this returns as soon as the run is accepted. Otherwise
    /// it waits up to the configured timeout for the result; a caller that
    /// stops waiting gets [`SagaError::WaitTimedOut`] while the run goes on.
    #[tracing::instrument(skip(self, input), fields(order_id = %input.order_id, not_wait = input.not_wait))]
    pub async fn order_products(&self, input: SagaInput) -> Result<()> {
        let not_wait = input.not_wait;
        let order_id = input.order_id;
        let handle = self.start(input).await?;
        if handle.input_dropped() {
            tracing::warn!(%order_id, "order products saga already running; request joined it unchanged");
        }

        if not_wait {
            tracing::debug!(workflow_id = handle.workflow_id(), "saga accepted");
            return Ok(());
        }

        let workflow_id = handle.workflow_id().to_string();
        let result = tokio::time::timeout(self.wait_timeout, handle.result())
            .await
            .map_err(|_| {
                tracing::warn!(%workflow_id, "stopped waiting for saga result");
                SagaError::WaitTimedOut {
                    workflow_id: workflow_id.clone(),
                }
            })?
            .map_err(SagaError::ResultError)?;

        check_result(result)
    }

    /// Starts the run on a detached task so that a caller dropping this
    /// future cannot interrupt the start half-way.
    async fn start(&self, input: SagaInput) -> Result<WorkflowHandle<SagaResult>> {
        let options = StartWorkflowOptions::new(workflow_id(input.order_id), &self.task_queue)
            .with_id_conflict(self.id_conflict);
        let engine = self.engine.clone();

        tokio::spawn(async move { engine.start(options, input).await })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "saga start task failed");
                SagaError::CantStart(WorkflowError::Abandoned)
            })?
            .map_err(SagaError::CantStart)
    }
}

/// Maps a saga result code to the façade's errors.
pub fn check_result(result: SagaResult) -> Result<()> {
    if result.is_ok {
        return Ok(());
    }
    match result.error_code {
        codes::CANT_RESERVE => Err(SagaError::CantReserve),
        codes::EMPTY_REQUEST => Err(SagaError::EmptyRequest),
        code => Err(SagaError::Unspecified { code }),
    }
}

#[async_trait]
impl ReservationSaga for SagaClient {
    async fn reserve_products(
        &self,
        order_id: OrderId,
        products: Vec<OrderProduct>,
    ) -> std::result::Result<(), AppError> {
        let input = SagaInput::new(order_id)
            .with_products(products)
            .with_status(OrderStatus::Created);
        self.order_products(input).await.map_err(AppError::from)
    }

    async fn update_composition(
        &self,
        order_id: OrderId,
        change: CompositionChange,
        not_wait: bool,
    ) -> std::result::Result<(), AppError> {
        let input = SagaInput {
            order_id,
            order_products: change.products,
            order_status: change.status,
            not_wait,
        };
        self.order_products(input).await.map_err(AppError::from)
    }
}
