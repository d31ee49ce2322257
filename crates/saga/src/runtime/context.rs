//! The workflow's only gateway to the outside world.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::events::{RunRecorder, WorkflowEvent};
use super::{ActivityFailure, ActivityOptions, ApplicationFailure};
use crate::error::WorkflowError;

/// Outcome of an activity as handed to workflow code.
pub type ActivityResult<T> = Result<T, ActivityFailure>;

/// Unbounded retries log at `error` every this many attempts.
const UNBOUNDED_RETRY_ALERT_EVERY: u32 = 10;

/// Runs single activity attempts. Retries and timeouts are the runtime's job.
#[async_trait]
pub trait ActivityExecutor: Send + Sync + 'static {
    type Request: Serialize + DeserializeOwned + Debug + Send + Sync;

    /// Stable name recorded in history and compared on replay.
    fn activity_name(request: &Self::Request) -> &'static str;

    async fn execute(&self, request: &Self::Request) -> Result<Value, ApplicationFailure>;
}

/// A recorded activity step found in history.
#[derive(Debug)]
struct RecordedStep {
    activity: String,
    outcome: Option<ActivityResult<Value>>,
}

/// Execution context handed to a running workflow.
///
/// Every activity call is assigned a sequence number. When the step is
/// already in history its recorded outcome is returned; otherwise the
/// activity runs under its options and the outcome is recorded.
pub struct WorkflowContext<A: ActivityExecutor> {
    activities: Arc<A>,
    recorder: RunRecorder,
    replay: HashMap<u64, RecordedStep>,
    next_seq: u64,
}

impl<A: ActivityExecutor> WorkflowContext<A> {
    pub(crate) fn new(activities: Arc<A>, recorder: RunRecorder, history: &[WorkflowEvent]) -> Self {
        let mut replay: HashMap<u64, RecordedStep> = HashMap::new();
        for event in history {
            match event {
                WorkflowEvent::ActivityScheduled { seq, activity, .. } => {
                    replay.insert(
                        *seq,
                        RecordedStep {
                            activity: activity.clone(),
                            outcome: None,
                        },
                    );
                }
                WorkflowEvent::ActivityCompleted { seq, output } => {
                    if let Some(step) = replay.get_mut(seq) {
                        step.outcome = Some(Ok(output.clone()));
                    }
                }
                WorkflowEvent::ActivityFailed { seq, failure } => {
                    if let Some(step) = replay.get_mut(seq) {
                        step.outcome = Some(Err(failure.clone()));
                    }
                }
                _ => {}
            }
        }

        Self {
            activities,
            recorder,
            replay,
            next_seq: 0,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.recorder.run().workflow_id
    }

    /// Returns true while recorded steps remain to be replayed.
    pub fn is_replaying(&self) -> bool {
        !self.replay.is_empty()
    }

    /// Executes an activity and decodes its output as `T`.
    ///
    /// The outer error is a runtime failure that aborts the workflow; the
    /// inner one is the activity's own failure for the workflow to handle.
    pub async fn execute_activity<T: DeserializeOwned>(
        &mut self,
        options: &ActivityOptions,
        request: A::Request,
    ) -> Result<ActivityResult<T>, WorkflowError> {
        self.next_seq += 1;
        let seq = self.next_seq;
        let name = A::activity_name(&request);

        let recorded = match self.replay.remove(&seq) {
            Some(step) if step.activity != name => {
                return Err(WorkflowError::NonDeterminism {
                    seq,
                    recorded: step.activity,
                    issued: name.to_string(),
                });
            }
            Some(step) => step.outcome,
            None => {
                self.recorder
                    .record(&WorkflowEvent::ActivityScheduled {
                        seq,
                        activity: name.to_string(),
                        request: serde_json::to_value(&request)?,
                    })
                    .await?;
                None
            }
        };

        let outcome = match recorded {
            Some(outcome) => {
                tracing::debug!(workflow_id = %self.workflow_id(), seq, activity = name, "replayed activity outcome");
                outcome
            }
            None => {
                // Scheduled but never finished steps run again: at-least-once.
                let outcome = self.run_attempts(options, &request, name).await;
                let event = match &outcome {
                    Ok(output) => WorkflowEvent::ActivityCompleted {
                        seq,
                        output: output.clone(),
                    },
                    Err(failure) => WorkflowEvent::ActivityFailed {
                        seq,
                        failure: failure.clone(),
                    },
                };
                self.recorder.record(&event).await?;
                outcome
            }
        };

        match outcome {
            Ok(output) => Ok(Ok(serde_json::from_value(output)?)),
            Err(failure) => Ok(Err(failure)),
        }
    }

    async fn run_attempts(
        &self,
        options: &ActivityOptions,
        request: &A::Request,
        name: &'static str,
    ) -> ActivityResult<Value> {
        let policy = &options.retry_policy;
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            metrics::counter!("activity_attempts_total", "activity" => name).increment(1);

            let attempted = tokio::time::timeout(
                options.start_to_close_timeout,
                self.activities.execute(request),
            )
            .await;

            let failure = match attempted {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(failure)) => ActivityFailure::Application(failure),
                Err(_) => ActivityFailure::timeout(name, options.start_to_close_timeout),
            };

            metrics::counter!(
                "activity_failures_total",
                "activity" => name,
                "kind" => failure.kind()
            )
            .increment(1);

            if failure.is_non_retryable() || policy.attempts_exhausted(attempt) {
                tracing::warn!(
                    workflow_id = %self.workflow_id(),
                    activity = name,
                    attempt,
                    error = %failure,
                    "activity failed"
                );
                return Err(failure);
            }

            let delay = policy.delay_for_attempt(attempt);
            if policy.is_unlimited() && attempt % UNBOUNDED_RETRY_ALERT_EVERY == 0 {
                tracing::error!(
                    workflow_id = %self.workflow_id(),
                    activity = name,
                    attempt,
                    error = %failure,
                    "activity still failing under unbounded retry"
                );
            } else {
                tracing::warn!(
                    workflow_id = %self.workflow_id(),
                    activity = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "activity attempt failed, retrying"
                );
            }
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) async fn record(&mut self, event: &WorkflowEvent) -> Result<(), WorkflowError> {
        self.recorder.record(event).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use history::{HistoryStore, InMemoryHistoryStore, RunId, RunInfo};
    use serde::Deserialize;

    use super::*;
    use crate::runtime::RetryPolicy;

    #[derive(Debug, Serialize, Deserialize)]
    enum EchoRequest {
        Echo(u32),
        Other,
    }

    /// Fails the first `failures` attempts, optionally by hanging.
    #[derive(Default)]
    struct FlakyEcho {
        calls: AtomicU32,
        failures: u32,
        hang: bool,
        non_retryable: bool,
    }

    #[async_trait]
    impl ActivityExecutor for FlakyEcho {
        type Request = EchoRequest;

        fn activity_name(request: &EchoRequest) -> &'static str {
            match request {
                EchoRequest::Echo(_) => "Echo",
                EchoRequest::Other => "Other",
            }
        }

        async fn execute(&self, request: &EchoRequest) -> Result<Value, ApplicationFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                if self.hang {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                return Err(ApplicationFailure::new("flaky").with_non_retryable(self.non_retryable));
            }
            match request {
                EchoRequest::Echo(n) => Ok(serde_json::json!(n)),
                EchoRequest::Other => Ok(Value::Null),
            }
        }
    }

    fn options(attempts: u32) -> ActivityOptions {
        ActivityOptions::new(Duration::from_secs(2), RetryPolicy::limited(attempts))
    }

    async fn context(
        executor: FlakyEcho,
        history: &[WorkflowEvent],
    ) -> (WorkflowContext<FlakyEcho>, Arc<FlakyEcho>, Arc<InMemoryHistoryStore>, RunId) {
        let store = Arc::new(InMemoryHistoryStore::new());
        let run = RunInfo {
            run_id: RunId::new(),
            workflow_id: "wf-1".to_string(),
            workflow_type: "Test".to_string(),
        };
        let run_id = run.run_id;
        let executor = Arc::new(executor);
        let recorder = RunRecorder::new(store.clone(), run);
        (
            WorkflowContext::new(executor.clone(), recorder, history),
            executor,
            store,
            run_id,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_and_records_outcome() {
        let (mut ctx, executor, store, run_id) = context(
            FlakyEcho {
                failures: 2,
                ..Default::default()
            },
            &[],
        )
        .await;

        let result: u32 = ctx
            .execute_activity(&options(3), EchoRequest::Echo(7))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result, 7);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);

        let records = store.load_run(run_id).await.unwrap();
        let types: Vec<_> = records.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(types, vec!["ActivityScheduled", "ActivityCompleted"]);
    }

    #[tokio::test(start_paused = true)]
    async fn limited_policy_gives_up() {
        let (mut ctx, executor, store, run_id) = context(
            FlakyEcho {
                failures: 10,
                ..Default::default()
            },
            &[],
        )
        .await;

        let result = ctx
            .execute_activity::<u32>(&options(3), EchoRequest::Echo(1))
            .await
            .unwrap();

        assert!(result.is_err());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        let records = store.load_run(run_id).await.unwrap();
        assert_eq!(records[1].event_type, "ActivityFailed");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_stops_immediately() {
        let (mut ctx, executor, _, _) = context(
            FlakyEcho {
                failures: 10,
                non_retryable: true,
                ..Default::default()
            },
            &[],
        )
        .await;

        let unbounded = ActivityOptions::new(Duration::from_secs(2), RetryPolicy::default());
        let result = ctx
            .execute_activity::<u32>(&unbounded, EchoRequest::Echo(1))
            .await
            .unwrap();

        assert!(result.unwrap_err().is_non_retryable());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_times_out() {
        let (mut ctx, _, _, _) = context(
            FlakyEcho {
                failures: 1,
                hang: true,
                ..Default::default()
            },
            &[],
        )
        .await;

        let result = ctx
            .execute_activity::<u32>(&options(1), EchoRequest::Echo(1))
            .await
            .unwrap();

        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_retry_eventually_succeeds() {
        let (mut ctx, executor, _, _) = context(
            FlakyEcho {
                failures: 25,
                ..Default::default()
            },
            &[],
        )
        .await;

        let unbounded = ActivityOptions::new(
            Duration::from_secs(2),
            RetryPolicy::unlimited(Duration::from_secs(1), Duration::from_secs(30)),
        );
        let result: u32 = ctx
            .execute_activity(&unbounded, EchoRequest::Echo(5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result, 5);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 26);
    }

    #[tokio::test]
    async fn replay_returns_recorded_outcome_without_running() {
        let history = vec![
            WorkflowEvent::ActivityScheduled {
                seq: 1,
                activity: "Echo".to_string(),
                request: serde_json::json!({"Echo": 3}),
            },
            WorkflowEvent::ActivityCompleted {
                seq: 1,
                output: serde_json::json!(3),
            },
        ];
        let (mut ctx, executor, _, _) = context(FlakyEcho::default(), &history).await;
        assert!(ctx.is_replaying());

        let result: u32 = ctx
            .execute_activity(&options(3), EchoRequest::Echo(3))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert!(!ctx.is_replaying());
    }

    #[tokio::test]
    async fn replay_detects_a_different_activity() {
        let history = vec![WorkflowEvent::ActivityScheduled {
            seq: 1,
            activity: "Echo".to_string(),
            request: serde_json::json!({"Echo": 3}),
        }];
        let (mut ctx, _, _, _) = context(FlakyEcho::default(), &history).await;

        let result = ctx
            .execute_activity::<Value>(&options(3), EchoRequest::Other)
            .await;

        assert!(matches!(
            result,
            Err(WorkflowError::NonDeterminism { seq: 1, .. })
        ));
    }
}
