//! Saga and workflow runtime error types.

use common::{AppError, ErrorKind};
use history::HistoryStoreError;
use thiserror::Error;

/// Errors raised by the workflow runtime itself, as opposed to activity
/// failures, which a workflow receives as values.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A run with the same workflow ID is still active.
    #[error("Workflow '{workflow_id}' is already running")]
    AlreadyStarted { workflow_id: String },

    /// The engine does not poll the requested task queue.
    #[error("Unknown task queue '{0}'")]
    UnknownTaskQueue(String),

    /// Replayed code issued a different activity than the recorded one.
    #[error("Non-deterministic workflow: step {seq} recorded '{recorded}', replay issued '{issued}'")]
    NonDeterminism {
        seq: u64,
        recorded: String,
        issued: String,
    },

    #[error("Unsupported history schema version {0}")]
    UnsupportedHistoryVersion(u32),

    #[error("Corrupt workflow history: {0}")]
    CorruptHistory(String),

    /// The run ended in `WorkflowFailed`.
    #[error("Workflow execution failed: {0}")]
    ExecutionFailed(String),

    /// Workflow or activity code panicked; the run was closed as failed.
    #[error("Workflow execution panicked: {0}")]
    Panicked(String),

    /// The task driving the run went away without reporting an outcome.
    #[error("Workflow execution was abandoned")]
    Abandoned,

    #[error("History store error: {0}")]
    History(#[from] HistoryStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by the saga client façade.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Saga could not be started: {0}")]
    CantStart(#[source] WorkflowError),

    #[error("Saga result could not be read: {0}")]
    ResultError(#[source] WorkflowError),

    /// The caller stopped waiting; the saga keeps running.
    #[error("Timed out waiting for saga '{workflow_id}'")]
    WaitTimedOut { workflow_id: String },

    #[error("can't reserve product")]
    CantReserve,

    #[error("empty request")]
    EmptyRequest,

    #[error("Saga failed with error code {code}")]
    Unspecified { code: u8 },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

impl From<SagaError> for AppError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::CantStart(WorkflowError::AlreadyStarted { workflow_id }) => {
                AppError::conflict("saga is already running")
                    .with_detail(format!("workflow id: {workflow_id}"))
            }
            SagaError::WaitTimedOut { .. } => {
                AppError::service_unavailable("order products are still being processed")
            }
            SagaError::CantReserve => AppError::conflict(err.to_string()),
            SagaError::EmptyRequest => AppError::bad_request(err.to_string()),
            SagaError::CantStart(_) | SagaError::ResultError(_) | SagaError::Unspecified { .. } => {
                tracing::error!(error = %err, "saga failed");
                AppError::new(ErrorKind::Internal)
            }
        }
    }
}
