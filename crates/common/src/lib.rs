//! Shared types for the order-products saga services.

pub mod error;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use types::{OrderId, ProductId, RunId};
