//! Activity failures as seen by a workflow.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error raised by activity code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ApplicationFailure {
    pub message: String,
    /// Free-form classifier; empty when the failure carries no type.
    pub error_type: String,
    /// Stops the retry loop immediately.
    pub non_retryable: bool,
    pub details: Option<serde_json::Value>,
}

impl ApplicationFailure {
    /// A retryable failure with no type and no details.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: String::new(),
            non_retryable: false,
            details: None,
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    pub fn with_non_retryable(mut self, non_retryable: bool) -> Self {
        self.non_retryable = non_retryable;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The final outcome of an activity whose attempts did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityFailure {
    #[error("{0}")]
    Application(ApplicationFailure),

    /// The last attempt exceeded its start-to-close timeout.
    #[error("Activity '{activity}' timed out after {timeout_ms}ms")]
    Timeout { activity: String, timeout_ms: u64 },
}

impl ActivityFailure {
    pub fn timeout(activity: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            activity: activity.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, Self::Application(f) if f.non_retryable)
    }

    pub fn application(&self) -> Option<&ApplicationFailure> {
        match self {
            Self::Application(f) => Some(f),
            Self::Timeout { .. } => None,
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Application(f) if f.non_retryable => "non_retryable",
            Self::Application(_) => "retryable",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<ApplicationFailure> for ActivityFailure {
    fn from(failure: ApplicationFailure) -> Self {
        Self::Application(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let failure = ActivityFailure::timeout("GetOrderBlockedProducts", Duration::from_secs(2));
        assert!(failure.is_timeout());
        assert!(!failure.is_non_retryable());
        assert!(failure.application().is_none());
        assert_eq!(failure.kind(), "timeout");
    }

    #[test]
    fn test_non_retryable_application_failure() {
        let failure: ActivityFailure = ApplicationFailure::new("bad request")
            .with_non_retryable(true)
            .into();
        assert!(failure.is_non_retryable());
        assert_eq!(failure.kind(), "non_retryable");
        assert_eq!(failure.to_string(), "bad request");
    }

    #[test]
    fn test_failure_survives_history_serialization() {
        let failure: ActivityFailure = ApplicationFailure::new("boom")
            .with_type("WrapError")
            .with_details(serde_json::json!({"code": 500}))
            .into();

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "application");
        let back: ActivityFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }
}
