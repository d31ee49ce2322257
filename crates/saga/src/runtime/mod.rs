//! A small durable-execution runtime.
//!
//! Workflows are deterministic procedures whose only side effects are
//! activities invoked through a [`WorkflowContext`]. Every decision is
//! appended to a [`history::HistoryStore`], so a run interrupted by a
//! restart is resumed by replaying its recorded activity outcomes.

mod context;
mod engine;
mod events;
mod failure;
mod retry;

pub use context::{ActivityExecutor, ActivityResult, WorkflowContext};
pub use engine::{
    IdConflictPolicy, StartWorkflowOptions, Workflow, WorkflowEngine, WorkflowHandle,
};
pub use events::{HISTORY_SCHEMA_VERSION, RunRecorder, WorkflowEvent, decode_run};
pub use failure::{ActivityFailure, ApplicationFailure};
pub use retry::{ActivityOptions, RetryPolicy};
