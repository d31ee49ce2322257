//! In-process implementations of the saga's remote collaborators.

pub mod catalog;
pub mod orders;

pub use catalog::InMemoryCatalog;
pub use orders::OrderServiceClient;
