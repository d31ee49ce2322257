//! Translation between [`AppError`] and activity failures.
//!
//! An `AppError` crossing an activity boundary becomes an
//! [`ApplicationFailure`] of type [`WRAP_ERROR_TYPE`] carrying a
//! [`TransportError`] payload. Client errors (`code < 500`) are marked
//! non-retryable so the runtime fails fast on them.

use common::{AppError, ErrorKind};
use serde::{Deserialize, Serialize};

use crate::runtime::{ActivityFailure, ApplicationFailure};

/// Failure type tag of bridged errors.
pub const WRAP_ERROR_TYPE: &str = "WrapError";

/// Structured payload attached to a bridged failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub code: u16,
    pub message: String,
    pub details: Vec<String>,
}

impl From<&AppError> for TransportError {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code(),
            message: err.message().to_string(),
            details: err.details().to_vec(),
        }
    }
}

/// Wraps a local error for the activity failure channel.
pub fn to_transport_error(err: &AppError) -> ApplicationFailure {
    let payload = TransportError::from(err);
    let failure = ApplicationFailure::new(err.to_string())
        .with_type(WRAP_ERROR_TYPE)
        .with_non_retryable(err.is_client_error());

    match serde_json::to_value(&payload) {
        Ok(details) => failure.with_details(details),
        Err(e) => {
            tracing::warn!(error = %e, "transport error payload not serializable");
            failure
        }
    }
}

/// Recovers the local error from a bridged failure.
///
/// Returns `None` for failures that are not structured: timeouts, untyped
/// failures, failures without a payload and payloads that do not decode.
pub fn from_transport_error(failure: &ActivityFailure) -> Option<AppError> {
    let failure = failure.application()?;
    if failure.error_type.is_empty() {
        return None;
    }

    let details = failure.details.clone()?;
    let payload: TransportError = serde_json::from_value(details).ok()?;

    Some(
        AppError::new(ErrorKind::from_code(payload.code))
            .with_message(payload.message)
            .with_details(payload.details),
    )
}
