//! Workflow contract: steps, resumption values and the definition registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use super::EngineError;
use super::activity::{ActivityCall, Outcome};

/// What a workflow asks the engine to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Run one activity; resumes with [`Resumed::Activity`]
    Activity(ActivityCall),
    /// Fan out `calls` with at most `limit` in flight; resumes with
    /// [`Resumed::Batch`] in input order
    Batch { calls: Vec<ActivityCall>, limit: usize },
    /// Durable pause; resumes with [`Resumed::TimerFired`]
    Timer(Duration),
    /// Start a child run and wait for it; resumes with [`Resumed::SubRun`]
    SubRun { definition: String, input: Value },
    /// Finish the run with `result`
    Complete(Value),
}

/// Value handed back to [`Workflow::next`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resumed {
    Start,
    Activity(Outcome),
    Batch(Vec<Outcome>),
    TimerFired,
    SubRun(Outcome),
}

impl Resumed {
    /// Name used in "unexpected resumption" errors.
    pub fn label(&self) -> &'static str {
        match self {
            Resumed::Start => "start",
            Resumed::Activity(_) => "activity",
            Resumed::Batch(_) => "batch",
            Resumed::TimerFired => "timer",
            Resumed::SubRun(_) => "sub-run",
        }
    }
}

/// A resumable state machine.
///
/// `next` must be deterministic: given the same input and the same sequence of
/// resumption values it has to produce the same steps. Side effects belong in
/// activities, never here.
pub trait Workflow: Send {
    fn next(&mut self, ctx: &mut WorkflowContext, resumed: Resumed) -> Result<Step, EngineError>;
}

/// Per-run services available to a workflow while it decides its next step.
#[derive(Debug)]
pub struct WorkflowContext {
    run_id: Uuid,
    replaying: bool,
    custom_status: Option<String>,
    status_dirty: bool,
}

impl WorkflowContext {
    pub fn new(run_id: Uuid, custom_status: Option<String>) -> Self {
        Self {
            run_id,
            replaying: false,
            custom_status,
            status_dirty: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// True while the engine is re-deriving steps already in history.
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Free-text progress for pollers; no state transition.
    pub fn set_custom_status(&mut self, status: impl Into<String>) {
        let status = status.into();
        if self.custom_status.as_deref() != Some(status.as_str()) {
            self.custom_status = Some(status);
            self.status_dirty = true;
        }
    }

    pub fn custom_status(&self) -> Option<&str> {
        self.custom_status.as_deref()
    }

    pub(crate) fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    /// Returns the status to persist if it changed since the last call.
    pub(crate) fn take_dirty_status(&mut self) -> Option<String> {
        if !self.status_dirty {
            return None;
        }
        self.status_dirty = false;
        self.custom_status.clone()
    }
}

/// Factory for workflow instances of one definition.
pub trait WorkflowDefinition: Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds a fresh instance from the run input. Invalid input is an error.
    fn create(&self, input: &Value) -> Result<Box<dyn Workflow>, EngineError>;
}

/// Name-keyed set of workflow definitions.
#[derive(Clone, Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, Arc<dyn WorkflowDefinition>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: Arc<dyn WorkflowDefinition>) {
        self.definitions
            .insert(definition.name().to_string(), definition);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn WorkflowDefinition>, EngineError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDefinition(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }
}

impl fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.definitions.keys().collect();
        names.sort();
        f.debug_struct("DefinitionRegistry")
            .field("definitions", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_status_is_flushed_once_per_change() {
        let mut ctx = WorkflowContext::new(Uuid::new_v4(), None);
        assert_eq!(ctx.take_dirty_status(), None);

        ctx.set_custom_status("Processing page 0");
        assert_eq!(ctx.take_dirty_status().as_deref(), Some("Processing page 0"));
        assert_eq!(ctx.take_dirty_status(), None);

        ctx.set_custom_status("Processing page 0");
        assert_eq!(ctx.take_dirty_status(), None);
    }

    #[test]
    fn unknown_definition_is_reported_by_name() {
        let registry = DefinitionRegistry::new();
        let err = registry.get("show_ingest").err().expect("missing");
        assert!(matches!(err, EngineError::UnknownDefinition(name) if name == "show_ingest"));
    }
}
