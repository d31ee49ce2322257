//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of an order products saga.
///
/// State transitions:
/// ```text
/// Started ──► ReadingSnapshot ──► Reserving ──► Informing ──► Succeeded
///    │               │                │             │
///    │               │                │             └──► FailedAmbiguous ──► Compensating ──► FailedAfterCompensation
///    │               │                └──► FailedAmbiguous (timeout or 5xx)
///    │               │                └──► FailedReservation (4xx)
///    │               └──► FailedReservation
///    └──► Informing (status-only change)
/// ```
///
/// `FailedReservation` is every failure that left nothing to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    Started,
    ReadingSnapshot,
    Reserving,
    Informing,
    Succeeded,
    FailedReservation,
    FailedAmbiguous,
    Compensating,
    FailedAfterCompensation,
}

impl SagaState {
    /// Returns true if the saga may begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::FailedAmbiguous)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Succeeded | SagaState::FailedReservation | SagaState::FailedAfterCompensation
        )
    }

    /// Returns true if `next` directly follows this state.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Started, ReadingSnapshot)
                | (Started, Informing)
                | (ReadingSnapshot, Reserving)
                | (ReadingSnapshot, FailedReservation)
                | (Reserving, Informing)
                | (Reserving, FailedReservation)
                | (Reserving, FailedAmbiguous)
                | (Informing, Succeeded)
                | (Informing, FailedAmbiguous)
                | (Informing, FailedReservation)
                | (FailedAmbiguous, Compensating)
                | (Compensating, FailedAfterCompensation)
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Started => "Started",
            SagaState::ReadingSnapshot => "ReadingSnapshot",
            SagaState::Reserving => "Reserving",
            SagaState::Informing => "Informing",
            SagaState::Succeeded => "Succeeded",
            SagaState::FailedReservation => "FailedReservation",
            SagaState::FailedAmbiguous => "FailedAmbiguous",
            SagaState::Compensating => "Compensating",
            SagaState::FailedAfterCompensation => "FailedAfterCompensation",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
