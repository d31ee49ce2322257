use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{HistoryStoreError, Result, RunId};

/// Unique identifier for a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a record inside a run's history.
///
/// Sequences start at 1 for the first record of a run and increment by 1
/// for each following record. `Sequence::initial()` (0) is the position of
/// an empty run and is what a writer expects when starting one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Position of a run with no records.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Position of the first record.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One entry of a workflow run's append-only decision log.
///
/// The payload is opaque to the store; the runtime that writes it owns its
/// schema. A record with `closes_run` set marks the run as terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub record_id: RecordId,
    pub run_id: RunId,
    /// Deterministic workflow identity, shared by every run of the workflow.
    pub workflow_id: String,
    pub workflow_type: String,
    pub sequence: Sequence,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub closes_run: bool,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn builder() -> HistoryRecordBuilder {
        HistoryRecordBuilder::default()
    }
}

/// Builder for constructing history records.
#[derive(Debug, Default)]
pub struct HistoryRecordBuilder {
    record_id: Option<RecordId>,
    run_id: Option<RunId>,
    workflow_id: Option<String>,
    workflow_type: Option<String>,
    sequence: Option<Sequence>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    closes_run: bool,
    recorded_at: Option<DateTime<Utc>>,
}

impl HistoryRecordBuilder {
    /// Sets the record ID. If not set, a new ID will be generated.
    pub fn record_id(mut self, id: RecordId) -> Self {
        self.record_id = Some(id);
        self
    }

    pub fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Marks the record as the terminal record of its run.
    pub fn closes_run(mut self, closes_run: bool) -> Self {
        self.closes_run = closes_run;
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    /// Builds the record, failing if a required field is missing.
    pub fn build(self) -> Result<HistoryRecord> {
        Ok(HistoryRecord {
            record_id: self.record_id.unwrap_or_default(),
            run_id: self.run_id.ok_or(HistoryStoreError::MissingField("run_id"))?,
            workflow_id: self
                .workflow_id
                .ok_or(HistoryStoreError::MissingField("workflow_id"))?,
            workflow_type: self
                .workflow_type
                .ok_or(HistoryStoreError::MissingField("workflow_type"))?,
            sequence: self
                .sequence
                .ok_or(HistoryStoreError::MissingField("sequence"))?,
            event_type: self
                .event_type
                .ok_or(HistoryStoreError::MissingField("event_type"))?,
            payload: self
                .payload
                .ok_or(HistoryStoreError::MissingField("payload"))?,
            closes_run: self.closes_run,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ordering() {
        let s1 = Sequence::new(1);
        let s2 = Sequence::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
        assert_eq!(Sequence::initial().next(), Sequence::first());
    }

    #[test]
    fn builder_sets_all_fields() {
        let run_id = RunId::new();
        let payload = serde_json::json!({"seq": 1});

        let record = HistoryRecord::builder()
            .run_id(run_id)
            .workflow_id("order_products_7")
            .workflow_type("OrderProducts")
            .sequence(Sequence::first())
            .event_type("WorkflowStarted")
            .payload_raw(payload.clone())
            .build()
            .unwrap();

        assert_eq!(record.run_id, run_id);
        assert_eq!(record.workflow_id, "order_products_7");
        assert_eq!(record.sequence, Sequence::first());
        assert_eq!(record.payload, payload);
        assert!(!record.closes_run);
    }

    #[test]
    fn builder_reports_missing_field() {
        let result = HistoryRecord::builder()
            .run_id(RunId::new())
            .workflow_type("OrderProducts")
            .build();

        assert!(matches!(
            result,
            Err(HistoryStoreError::MissingField("workflow_id"))
        ));
    }
}
