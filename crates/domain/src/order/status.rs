//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// New ──► Created ──► InWork ──► Finished ──► Canceled
///  ▲ │
///  └─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order row exists but its products are not reserved yet.
    #[default]
    New,

    /// Products are reserved in the catalog.
    Created,

    /// Order is being assembled.
    InWork,

    /// Order has been delivered.
    Finished,

    /// Order was canceled (terminal status).
    Canceled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::New,
        OrderStatus::Created,
        OrderStatus::InWork,
        OrderStatus::Finished,
        OrderStatus::Canceled,
    ];

    /// Returns the statuses reachable from this one.
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::New => &[OrderStatus::New, OrderStatus::Created],
            OrderStatus::Created => &[OrderStatus::InWork],
            OrderStatus::InWork => &[OrderStatus::Finished],
            OrderStatus::Finished => &[OrderStatus::Canceled],
            OrderStatus::Canceled => &[],
        }
    }

    /// Returns true if `next` is in the transition table for this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Returns true if the order no longer accepts composition changes.
    pub fn is_closed(&self) -> bool {
        matches!(self, OrderStatus::Finished | OrderStatus::Canceled)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Created => "created",
            OrderStatus::InWork => "in_work",
            OrderStatus::Finished => "finished",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
