//! Starts, deduplicates and recovers workflow runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use history::{HistoryStore, RunId, RunInfo, Sequence};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinError;

use super::context::{ActivityExecutor, WorkflowContext};
use super::events::{HISTORY_SCHEMA_VERSION, RunRecorder, WorkflowEvent, decode_run};
use crate::error::WorkflowError;

/// A deterministic workflow definition.
///
/// `run` must be a pure function of its input and the activity outcomes the
/// context hands back: no clocks, no randomness, no I/O outside activities.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Type name recorded in history.
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Activities: ActivityExecutor;

    async fn run(
        &self,
        ctx: &mut WorkflowContext<Self::Activities>,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError>;
}

/// What to do when a run with the same workflow ID is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdConflictPolicy {
    /// Attach to the running execution.
    #[default]
    UseExisting,
    /// Reject the start with [`WorkflowError::AlreadyStarted`].
    Fail,
}

#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    pub id: String,
    pub task_queue: String,
    pub id_conflict: IdConflictPolicy,
}

impl StartWorkflowOptions {
    pub fn new(id: impl Into<String>, task_queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_queue: task_queue.into(),
            id_conflict: IdConflictPolicy::default(),
        }
    }

    pub fn with_id_conflict(mut self, policy: IdConflictPolicy) -> Self {
        self.id_conflict = policy;
        self
    }
}

/// Terminal outcome shared by every handle of a run.
type Outcome<O> = Option<Result<O, String>>;

/// Handle to a started (or attached) run.
#[derive(Debug)]
pub struct WorkflowHandle<O> {
    workflow_id: String,
    run_id: RunId,
    input_dropped: bool,
    outcome: watch::Receiver<Outcome<O>>,
}

impl<O: Clone> WorkflowHandle<O> {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// True when the start attached to a run begun with a different input;
    /// the input passed to that start was not used.
    pub fn input_dropped(&self) -> bool {
        self.input_dropped
    }

    /// Waits for the run to reach a terminal state.
    pub async fn result(mut self) -> Result<O, WorkflowError> {
        let outcome = {
            let outcome = self
                .outcome
                .wait_for(Option::is_some)
                .await
                .map_err(|_| WorkflowError::Abandoned)?;
            outcome.clone()
        };

        match outcome {
            Some(Ok(output)) => Ok(output),
            Some(Err(error)) => Err(WorkflowError::ExecutionFailed(error)),
            None => Err(WorkflowError::Abandoned),
        }
    }
}

struct RunningExecution<O> {
    run_id: RunId,
    input: serde_json::Value,
    outcome: watch::Receiver<Outcome<O>>,
}

struct EngineInner<W: Workflow> {
    workflow: W,
    activities: Arc<W::Activities>,
    store: Arc<dyn HistoryStore>,
    task_queue: String,
    running: Mutex<HashMap<String, RunningExecution<W::Output>>>,
}

/// Runs workflows of type `W` on one task queue.
///
/// Each run executes on a detached tokio task, so it reaches a terminal
/// state whether or not anyone awaits its handle.
pub struct WorkflowEngine<W: Workflow> {
    inner: Arc<EngineInner<W>>,
}

impl<W: Workflow> Clone for WorkflowEngine<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Workflow> WorkflowEngine<W> {
    pub fn new(
        workflow: W,
        activities: Arc<W::Activities>,
        store: Arc<dyn HistoryStore>,
        task_queue: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                workflow,
                activities,
                store,
                task_queue: task_queue.into(),
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.inner.task_queue
    }

    /// Starts a run, or attaches to the active run with the same ID.
    #[tracing::instrument(skip(self, input), fields(workflow = W::NAME, workflow_id = %options.id))]
    pub async fn start(
        &self,
        options: StartWorkflowOptions,
        input: W::Input,
    ) -> Result<WorkflowHandle<W::Output>, WorkflowError> {
        if options.task_queue != self.inner.task_queue {
            return Err(WorkflowError::UnknownTaskQueue(options.task_queue));
        }

        let input_value = serde_json::to_value(&input)?;
        let mut running = self.inner.running.lock().await;

        if let Some(existing) = running.get(&options.id)
            && existing.outcome.borrow().is_none()
        {
            return match options.id_conflict {
                IdConflictPolicy::UseExisting => {
                    let input_dropped = existing.input != input_value;
                    if input_dropped {
                        metrics::counter!("saga_dropped_inputs_total", "workflow" => W::NAME)
                            .increment(1);
                        tracing::warn!(run_id = %existing.run_id, "attached to running workflow started with a different input; this input is dropped");
                    } else {
                        tracing::info!(run_id = %existing.run_id, "attached to running workflow");
                    }
                    Ok(WorkflowHandle {
                        workflow_id: options.id,
                        run_id: existing.run_id,
                        input_dropped,
                        outcome: existing.outcome.clone(),
                    })
                }
                IdConflictPolicy::Fail => Err(WorkflowError::AlreadyStarted {
                    workflow_id: options.id,
                }),
            };
        }

        let run = RunInfo {
            run_id: RunId::new(),
            workflow_id: options.id.clone(),
            workflow_type: W::NAME.to_string(),
        };
        let mut recorder = RunRecorder::new(Arc::clone(&self.inner.store), run.clone());
        recorder
            .record(&WorkflowEvent::WorkflowStarted {
                schema_version: HISTORY_SCHEMA_VERSION,
                input: input_value.clone(),
            })
            .await?;

        let handle = self.spawn_run(&mut running, run, recorder, Vec::new(), input, input_value);
        metrics::counter!("saga_started_total", "workflow" => W::NAME).increment(1);
        tracing::info!(run_id = %handle.run_id, "workflow started");

        Ok(handle)
    }

    /// Re-spawns every open run of this workflow type found in history.
    ///
    /// Recorded activity outcomes are replayed; steps that were scheduled
    /// but never finished run again. Returns the number of resumed runs.
    #[tracing::instrument(skip(self), fields(workflow = W::NAME))]
    pub async fn recover(&self) -> Result<usize, WorkflowError> {
        let open = self.inner.store.open_runs().await?;
        let mut running = self.inner.running.lock().await;
        let mut resumed = 0;

        // Newest first: an older open run of the same workflow ID is stale.
        for run in open.into_iter().rev().filter(|r| r.workflow_type == W::NAME) {
            if let Some(current) = running.get(&run.workflow_id).map(|r| r.run_id) {
                let reason = format!("superseded by run {current}");
                match self.inner.close_run(&run, reason).await {
                    Ok(()) => {
                        tracing::warn!(run_id = %run.run_id, workflow_id = %run.workflow_id, superseded_by = %current, "closed stale workflow run")
                    }
                    Err(e) => {
                        tracing::error!(run_id = %run.run_id, workflow_id = %run.workflow_id, error = %e, "cannot close stale workflow run")
                    }
                }
                continue;
            }
            match self.load_for_resume(&run).await {
                Ok((input, input_value, history, last)) => {
                    let recorder =
                        RunRecorder::resume(Arc::clone(&self.inner.store), run.clone(), last);
                    self.spawn_run(&mut running, run, recorder, history, input, input_value);
                    resumed += 1;
                }
                Err(e) => {
                    tracing::error!(run_id = %run.run_id, workflow_id = %run.workflow_id, error = %e, "cannot resume workflow run");
                }
            }
        }

        tracing::info!(resumed, "workflow recovery finished");
        Ok(resumed)
    }

    async fn load_for_resume(
        &self,
        run: &RunInfo,
    ) -> Result<(W::Input, serde_json::Value, Vec<WorkflowEvent>, Sequence), WorkflowError> {
        let records = self.inner.store.load_run(run.run_id).await?;
        let history = decode_run(&records)?;
        let last = records
            .last()
            .map(|r| r.sequence)
            .unwrap_or(Sequence::initial());

        let input_value = match history.first() {
            Some(WorkflowEvent::WorkflowStarted { input, .. }) => input.clone(),
            _ => {
                return Err(WorkflowError::CorruptHistory(
                    "missing WorkflowStarted".to_string(),
                ));
            }
        };

        let input = serde_json::from_value(input_value.clone())?;
        Ok((input, input_value, history, last))
    }

    fn spawn_run(
        &self,
        running: &mut HashMap<String, RunningExecution<W::Output>>,
        run: RunInfo,
        recorder: RunRecorder,
        history: Vec<WorkflowEvent>,
        input: W::Input,
        input_value: serde_json::Value,
    ) -> WorkflowHandle<W::Output> {
        let (tx, rx) = watch::channel(None);
        running.insert(
            run.workflow_id.clone(),
            RunningExecution {
                run_id: run.run_id,
                input: input_value,
                outcome: rx.clone(),
            },
        );

        let inner = Arc::clone(&self.inner);
        let workflow_id = run.workflow_id.clone();
        let run_id = run.run_id;
        tokio::spawn(async move {
            let driven = tokio::spawn(EngineInner::drive(
                Arc::clone(&inner),
                run.clone(),
                recorder,
                history,
                input,
            ));
            let outcome = match driven.await {
                Ok(outcome) => outcome,
                Err(e) => Err(inner.abort_run(&run, e).await),
            };

            tx.send_replace(Some(outcome.map_err(|e| e.to_string())));
            inner.release(&run).await;
        });

        WorkflowHandle {
            workflow_id,
            run_id,
            input_dropped: false,
            outcome: rx,
        }
    }
}

impl<W: Workflow> EngineInner<W> {
    async fn drive(
        self: Arc<Self>,
        run: RunInfo,
        recorder: RunRecorder,
        history: Vec<WorkflowEvent>,
        input: W::Input,
    ) -> Result<W::Output, WorkflowError> {
        let started = Instant::now();
        let mut ctx = WorkflowContext::new(Arc::clone(&self.activities), recorder, &history);

        let outcome = self.workflow.run(&mut ctx, input).await;

        let closing = match &outcome {
            Ok(output) => match serde_json::to_value(output) {
                Ok(output) => WorkflowEvent::WorkflowCompleted { output },
                Err(e) => WorkflowEvent::WorkflowFailed {
                    error: e.to_string(),
                },
            },
            Err(e) => WorkflowEvent::WorkflowFailed {
                error: e.to_string(),
            },
        };
        if let Err(e) = ctx.record(&closing).await {
            tracing::error!(workflow_id = %run.workflow_id, run_id = %run.run_id, error = %e, "failed to close workflow run");
        }

        metrics::histogram!("saga_duration_seconds", "workflow" => W::NAME)
            .record(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(_) => {
                tracing::info!(workflow_id = %run.workflow_id, run_id = %run.run_id, "workflow completed")
            }
            Err(e) => {
                tracing::error!(workflow_id = %run.workflow_id, run_id = %run.run_id, error = %e, "workflow failed")
            }
        }

        outcome
    }

    /// Turns a run whose task died into a failed outcome and closes its history.
    async fn abort_run(&self, run: &RunInfo, err: JoinError) -> WorkflowError {
        let error = WorkflowError::Panicked(panic_message(err));
        metrics::counter!("saga_panics_total", "workflow" => W::NAME).increment(1);
        tracing::error!(workflow_id = %run.workflow_id, run_id = %run.run_id, error = %error, "workflow task died");

        if let Err(e) = self.close_run(run, error.to_string()).await {
            tracing::error!(workflow_id = %run.workflow_id, run_id = %run.run_id, error = %e, "failed to close workflow run");
        }
        error
    }

    /// Appends `WorkflowFailed` after whatever the run recorded last.
    async fn close_run(&self, run: &RunInfo, error: String) -> Result<(), WorkflowError> {
        let records = self.store.load_run(run.run_id).await?;
        if records.iter().any(|r| r.closes_run) {
            return Ok(());
        }
        let last = records
            .last()
            .map(|r| r.sequence)
            .unwrap_or(Sequence::initial());

        RunRecorder::resume(Arc::clone(&self.store), run.clone(), last)
            .record(&WorkflowEvent::WorkflowFailed { error })
            .await
    }

    /// Forgets the run, unless a newer run already took its workflow ID.
    async fn release(&self, run: &RunInfo) {
        let mut running = self.running.lock().await;
        if running
            .get(&run.workflow_id)
            .is_some_and(|r| r.run_id == run.run_id)
        {
            running.remove(&run.workflow_id);
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(err) => err.to_string(),
    }
}
