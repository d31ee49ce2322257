//! Domain error types.

use common::{AppError, ErrorKind};
use thiserror::Error;

use crate::order::{OrderError, RepositoryError};

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A collaborating service (catalog, saga) failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] AppError),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Order(e) => {
                let kind = match e {
                    OrderError::NotFound(_) => ErrorKind::NotFound,
                    _ => ErrorKind::BadRequest,
                };
                let details = match &e {
                    OrderError::InsufficientStock { details } => details.clone(),
                    OrderError::CantSetStatus { from, to } => vec![format!("{from} -> {to}")],
                    _ => Vec::new(),
                };
                AppError::new(kind)
                    .with_message(e.to_string())
                    .with_details(details)
            }
            DomainError::Repository(RepositoryError::NotFound(_)) => {
                AppError::not_found("order not found")
            }
            DomainError::Repository(RepositoryError::Conflict(_)) => {
                AppError::conflict("order was modified concurrently")
            }
            DomainError::Repository(e) => {
                tracing::error!(error = %e, "order storage failure");
                AppError::new(ErrorKind::Internal)
            }
            DomainError::Upstream(e) => e,
        }
    }
}
