//! Workflow history events and the per-run recorder that appends them.

use std::sync::Arc;

use history::{HistoryRecord, HistoryStore, RunInfo, Sequence};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ActivityFailure;
use crate::error::WorkflowError;

/// Version of the event schema below. Carried in `WorkflowStarted`.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// One entry of a run's decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    WorkflowStarted {
        schema_version: u32,
        input: Value,
    },
    ActivityScheduled {
        seq: u64,
        activity: String,
        request: Value,
    },
    ActivityCompleted {
        seq: u64,
        output: Value,
    },
    ActivityFailed {
        seq: u64,
        failure: ActivityFailure,
    },
    WorkflowCompleted {
        output: Value,
    },
    WorkflowFailed {
        error: String,
    },
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "WorkflowStarted",
            WorkflowEvent::ActivityScheduled { .. } => "ActivityScheduled",
            WorkflowEvent::ActivityCompleted { .. } => "ActivityCompleted",
            WorkflowEvent::ActivityFailed { .. } => "ActivityFailed",
            WorkflowEvent::WorkflowCompleted { .. } => "WorkflowCompleted",
            WorkflowEvent::WorkflowFailed { .. } => "WorkflowFailed",
        }
    }

    /// Terminal events close the run.
    pub fn closes_run(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::WorkflowCompleted { .. } | WorkflowEvent::WorkflowFailed { .. }
        )
    }
}

/// Appends events of a single run, tracking the expected sequence.
pub struct RunRecorder {
    store: Arc<dyn HistoryStore>,
    run: RunInfo,
    last: Sequence,
}

impl RunRecorder {
    /// Recorder for a run with no history yet.
    pub fn new(store: Arc<dyn HistoryStore>, run: RunInfo) -> Self {
        Self::resume(store, run, Sequence::initial())
    }

    /// Recorder continuing a run whose last stored sequence is `last`.
    pub fn resume(store: Arc<dyn HistoryStore>, run: RunInfo, last: Sequence) -> Self {
        Self { store, run, last }
    }

    pub fn run(&self) -> &RunInfo {
        &self.run
    }

    pub async fn record(&mut self, event: &WorkflowEvent) -> Result<(), WorkflowError> {
        let record = HistoryRecord::builder()
            .run_id(self.run.run_id)
            .workflow_id(self.run.workflow_id.clone())
            .workflow_type(self.run.workflow_type.clone())
            .sequence(self.last.next())
            .event_type(event.event_type())
            .payload(event)?
            .closes_run(event.closes_run())
            .build()?;

        self.last = self.store.append(vec![record], self.last).await?;
        Ok(())
    }
}

/// Decodes a stored run into events, checking the schema version.
pub fn decode_run(records: &[HistoryRecord]) -> Result<Vec<WorkflowEvent>, WorkflowError> {
    let events = records
        .iter()
        .map(|r| serde_json::from_value::<WorkflowEvent>(r.payload.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    match events.first() {
        Some(WorkflowEvent::WorkflowStarted { schema_version, .. })
            if *schema_version == HISTORY_SCHEMA_VERSION =>
        {
            Ok(events)
        }
        Some(WorkflowEvent::WorkflowStarted { schema_version, .. }) => {
            Err(WorkflowError::UnsupportedHistoryVersion(*schema_version))
        }
        _ => Err(WorkflowError::CorruptHistory(
            "run does not begin with WorkflowStarted".to_string(),
        )),
    }
}
