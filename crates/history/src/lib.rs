pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::RunId;
pub use error::{HistoryStoreError, Result};
pub use memory::InMemoryHistoryStore;
pub use postgres::PostgresHistoryStore;
pub use record::{HistoryRecord, HistoryRecordBuilder, RecordId, Sequence};
pub use store::{HistoryStore, RunInfo};
