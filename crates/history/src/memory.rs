use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    HistoryRecord, HistoryStoreError, Result, RunId, Sequence,
    store::{HistoryStore, RunInfo, validate_append},
};

#[derive(Default)]
struct State {
    runs: HashMap<RunId, Vec<HistoryRecord>>,
    /// Runs in the order their first record was appended.
    started: Vec<RunInfo>,
}

/// In-memory history store.
///
/// Provides the same interface and conflict semantics as the PostgreSQL
/// implementation. History is lost when the process exits.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored across all runs.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.runs.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, records: Vec<HistoryRecord>, expected: Sequence) -> Result<Sequence> {
        validate_append(&records, expected)?;

        let first = &records[0];
        let run_id = first.run_id;
        let info = RunInfo {
            run_id,
            workflow_id: first.workflow_id.clone(),
            workflow_type: first.workflow_type.clone(),
        };

        let mut state = self.state.write().await;
        let actual = state
            .runs
            .get(&run_id)
            .and_then(|run| run.last())
            .map(|r| r.sequence)
            .unwrap_or(Sequence::initial());

        if actual != expected {
            return Err(HistoryStoreError::Conflict {
                run_id,
                expected,
                actual,
            });
        }

        let last = records
            .last()
            .map(|r| r.sequence)
            .unwrap_or(Sequence::initial());

        if actual == Sequence::initial() {
            state.started.push(info);
        }
        state.runs.entry(run_id).or_default().extend(records);

        Ok(last)
    }

    async fn load_run(&self, run_id: RunId) -> Result<Vec<HistoryRecord>> {
        let state = self.state.read().await;
        Ok(state.runs.get(&run_id).cloned().unwrap_or_default())
    }

    async fn open_runs(&self) -> Result<Vec<RunInfo>> {
        let state = self.state.read().await;
        let open = state
            .started
            .iter()
            .filter(|info| {
                state
                    .runs
                    .get(&info.run_id)
                    .is_some_and(|run| !run.iter().any(|r| r.closes_run))
            })
            .cloned()
            .collect();
        Ok(open)
    }

    async fn runs_for_workflow(&self, workflow_id: &str) -> Result<Vec<RunInfo>> {
        let state = self.state.read().await;
        Ok(state
            .started
            .iter()
            .filter(|info| info.workflow_id == workflow_id)
            .cloned()
            .collect())
    }
}
