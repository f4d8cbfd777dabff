//! # Workflow Engine
//!
//! Durable, replayable orchestration for ingestion runs.
//!
//! A run's decisions are recorded in an append-only history. Every time a run
//! is driven, its workflow is re-created from the run input and fed the
//! recorded results in order; the first step without a recorded result is
//! executed for real. Activities execute at least once, scheduling decisions
//! are recorded exactly once.

use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

pub mod activity;
pub mod context;
pub mod engine;
pub mod history;
pub mod replay;
pub mod retry;
pub mod run_store;
pub mod scheduler;

pub use activity::{Activity, ActivityCall, ActivityFailure, ActivityRegistry, Outcome};
pub use context::{DefinitionRegistry, Resumed, Step, Workflow, WorkflowContext, WorkflowDefinition};
pub use engine::{TerminateAllReport, TerminateFailure, WorkflowEngine};
pub use history::{EventKind, HistoryStore, RecordedEvent};
pub use retry::{RetryFailure, RetryPolicy};
pub use run_store::{RunCursor, RunQuery, RunSnapshot, RunStatus, RunStore};
pub use scheduler::{BatchObserver, TaskScheduler};

/// Engine failures. Everything except [`EngineError::Store`] fails the run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] DbErr),

    #[error("unknown workflow definition '{0}'")]
    UnknownDefinition(String),

    #[error("invalid input for '{definition}': {message}")]
    InvalidInput { definition: String, message: String },

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error(
        "nondeterministic workflow in run {run_id} at event {sequence}: expected {expected}, history has {found}"
    )]
    Nondeterminism {
        run_id: Uuid,
        sequence: i64,
        expected: String,
        found: String,
    },

    #[error("corrupt history in run {run_id} at event {sequence}: {message}")]
    CorruptHistory {
        run_id: Uuid,
        sequence: i64,
        message: String,
    },

    #[error("workflow error: {0}")]
    Workflow(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Store errors leave the run resumable; everything else is final.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Store(_))
    }

    pub fn invalid_input(definition: &str, message: impl std::fmt::Display) -> Self {
        EngineError::InvalidInput {
            definition: definition.to_string(),
            message: message.to_string(),
        }
    }

    /// Error for a workflow resumed with a value it did not ask for.
    pub fn unexpected(state: &str, resumed: &Resumed) -> Self {
        EngineError::Workflow(format!(
            "unexpected {} resumption in state {}",
            resumed.label(),
            state
        ))
    }
}
