use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{HistoryRecord, HistoryStoreError, Result, RunId, Sequence};

/// Identity of a workflow run as known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: RunId,
    pub workflow_id: String,
    pub workflow_type: String,
}

/// Core trait for workflow history storage.
///
/// A history store persists the append-only decision log of every workflow
/// run. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends records to a run.
    ///
    /// Records are appended atomically: either all succeed or none do. The
    /// operation fails with `Conflict` if the run's last stored sequence is
    /// not `expected`.
    ///
    /// Returns the sequence of the last appended record.
    async fn append(&self, records: Vec<HistoryRecord>, expected: Sequence) -> Result<Sequence>;

    /// Retrieves all records of a run in sequence order.
    async fn load_run(&self, run_id: RunId) -> Result<Vec<HistoryRecord>>;

    /// Lists runs that have not recorded a terminal record yet, oldest first.
    async fn open_runs(&self) -> Result<Vec<RunInfo>>;

    /// Lists every run ever started for a workflow ID, oldest first.
    async fn runs_for_workflow(&self, workflow_id: &str) -> Result<Vec<RunInfo>>;
}

/// Validates a batch before appending.
///
/// The batch must be non-empty, belong to one run and carry consecutive
/// sequences starting right after `expected`.
pub fn validate_append(records: &[HistoryRecord], expected: Sequence) -> Result<()> {
    let Some(first) = records.first() else {
        return Err(HistoryStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut next = expected.next();
    for record in records {
        if record.run_id != first.run_id {
            return Err(HistoryStoreError::InvalidAppend(
                "all records must belong to the same run".to_string(),
            ));
        }
        if record.sequence != next {
            return Err(HistoryStoreError::InvalidAppend(format!(
                "sequences must be consecutive: expected {}, got {}",
                next, record.sequence
            )));
        }
        next = next.next();
    }

    Ok(())
}
