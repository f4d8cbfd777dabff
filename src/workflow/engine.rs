//! Replay interpreter and run lifecycle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::activity::{ActivityCall, ActivityRegistry, Outcome};
use super::context::{DefinitionRegistry, Resumed, Step, WorkflowContext};
use super::history::{EventKind, HistoryStore};
use super::replay::{ReplayCursor, ReplayedSubRun};
use super::run_store::{RunQuery, RunSnapshot, RunStatus, RunStore, parse_status};
use super::scheduler::{BatchObserver, TaskScheduler};
use super::EngineError;
use crate::config::WorkflowConfig;
use crate::error::FailureKind;
use crate::models::workflow_run;

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Result of a step that crossed a suspension boundary.
enum Advance<T> {
    Continue(T),
    Terminated(String),
}

impl<T> Advance<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> Advance<U> {
        match self {
            Advance::Continue(value) => Advance::Continue(f(value)),
            Advance::Terminated(reason) => Advance::Terminated(reason),
        }
    }
}

/// Outcome of a bulk termination request.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TerminateAllReport {
    pub terminated: Vec<Uuid>,
    pub failures: Vec<TerminateFailure>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TerminateFailure {
    pub run_id: Uuid,
    pub error: String,
}

/// Durable workflow engine.
///
/// Each run has at most one driver per process. A driver keeps the workflow
/// instance in memory between steps; a cold [`resume`](Self::resume) rebuilds
/// it purely from history.
pub struct WorkflowEngine {
    runs: RunStore,
    history: HistoryStore,
    scheduler: TaskScheduler,
    definitions: DefinitionRegistry,
    active: Mutex<HashSet<Uuid>>,
}

/// Removes the run from the active set when the driver finishes.
struct RunGuard<'a> {
    active: &'a Mutex<HashSet<Uuid>>,
    run_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.run_id);
    }
}

/// Appends each completion to history as soon as it arrives.
struct HistoryObserver<'a> {
    history: &'a HistoryStore,
    run_id: Uuid,
    sequences: Vec<i64>,
}

#[async_trait]
impl<'a> BatchObserver for HistoryObserver<'a> {
    async fn on_complete(&self, index: usize, outcome: &Outcome) -> Result<(), EngineError> {
        let scheduled = self.sequences.get(index).copied().ok_or_else(|| {
            EngineError::Workflow(format!("completion for unknown batch slot {}", index))
        })?;
        self.history
            .append_one(self.run_id, EventKind::activity_outcome(scheduled, outcome))
            .await?;
        Ok(())
    }
}

impl WorkflowEngine {
    pub fn new(
        db: DatabaseConnection,
        definitions: DefinitionRegistry,
        activities: ActivityRegistry,
        config: &WorkflowConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            runs: RunStore::new(db.clone()),
            history: HistoryStore::new(db, retry),
            scheduler: TaskScheduler::new(Arc::new(activities), retry, config.worker_pool_size),
            definitions,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    /// Creates a Pending run. Input is validated by building the workflow once.
    #[instrument(skip(self, input))]
    pub async fn start_run(&self, definition: &str, input: Value) -> Result<Uuid, EngineError> {
        self.definitions.get(definition)?.create(&input)?;

        let run_id = Uuid::new_v4();
        self.runs.create(run_id, definition, input, None).await?;
        counter!("workflow_runs_started_total", "definition" => definition.to_string()).increment(1);
        info!(%run_id, "Run created");
        Ok(run_id)
    }

    /// Creates a run and drives it in the background.
    pub async fn submit(self: &Arc<Self>, definition: &str, input: Value) -> Result<Uuid, EngineError> {
        let run_id = self.start_run(definition, input).await?;
        self.spawn_run(run_id);
        Ok(run_id)
    }

    /// Creates a run and drives it on the current task until it is terminal.
    pub async fn run_to_completion(&self, definition: &str, input: Value) -> Result<RunSnapshot, EngineError> {
        let run_id = self.start_run(definition, input).await?;
        self.resume(run_id).await?;
        self.status(run_id).await
    }

    pub fn spawn_run(self: &Arc<Self>, run_id: Uuid) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.resume(run_id).await {
                Ok(status) => debug!(%run_id, %status, "Driver finished"),
                Err(err) => error!(%run_id, error = %err, "Driver stopped; run stays resumable"),
            }
        })
    }

    /// Drives a run until it is terminal.
    ///
    /// No-op for terminal runs, and for runs another driver in this process
    /// already owns; both return the current status.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn resume(&self, run_id: Uuid) -> Result<RunStatus, EngineError> {
        let run = self.runs.require(run_id).await?;
        let status = parse_status(&run)?;
        if status.is_terminal() {
            return Ok(status);
        }

        let Some(_guard) = self.claim(run_id) else {
            debug!("Run already has a driver");
            return Ok(status);
        };

        // Re-read under the guard; a previous driver may just have finished
        let run = self.runs.require(run_id).await?;
        let status = parse_status(&run)?;
        if status.is_terminal() {
            return Ok(status);
        }
        let run = if status == RunStatus::Pending {
            self.runs.mark_running(run).await?
        } else {
            run
        };

        let definition = run.definition.clone();
        let outcome = match self.drive(run).await {
            Ok(status) => Ok(status),
            Err(err) if err.is_fatal() => {
                error!(error = %err, "Run failed");
                self.runs.fail(run_id, &err.to_string()).await?;
                Ok(RunStatus::Failed)
            }
            Err(err) => {
                warn!(error = %err, "Run interrupted by store error");
                Err(err)
            }
        };

        if let Ok(status) = &outcome {
            counter!(
                "workflow_runs_finished_total",
                "definition" => definition,
                "status" => status.as_str()
            )
            .increment(1);
        }
        outcome
    }

    /// Requests termination of a run and its active sub-runs.
    ///
    /// Returns `false` when the run was already terminal. Runs without a live
    /// driver get one so the request is observed promptly.
    pub async fn terminate(self: &Arc<Self>, run_id: Uuid, reason: &str) -> Result<bool, EngineError> {
        if !self.runs.request_termination(run_id, reason).await? {
            return Ok(false);
        }
        info!(%run_id, reason, "Termination requested");

        let mut pending = vec![run_id];
        while let Some(parent) = pending.pop() {
            for child in self.runs.active_children(parent).await? {
                self.runs.request_termination(child.id, reason).await?;
                pending.push(child.id);
            }
        }

        if !self.is_active(run_id) {
            self.spawn_run(run_id);
        }
        Ok(true)
    }

    /// Requests termination of every Pending or Running top-level run.
    pub async fn terminate_all_active(self: &Arc<Self>, reason: &str) -> Result<TerminateAllReport, EngineError> {
        let mut report = TerminateAllReport::default();
        for run in self.runs.list_active().await? {
            if run.parent_run_id.is_some() {
                continue;
            }
            match self.terminate(run.id, reason).await {
                Ok(true) => report.terminated.push(run.id),
                Ok(false) => {}
                Err(err) => {
                    warn!(run_id = %run.id, error = %err, "Failed to terminate run");
                    report.failures.push(TerminateFailure {
                        run_id: run.id,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    pub async fn status(&self, run_id: Uuid) -> Result<RunSnapshot, EngineError> {
        self.runs.require(run_id).await?.try_into()
    }

    pub async fn list_runs(&self, query: &RunQuery) -> Result<Vec<RunSnapshot>, EngineError> {
        self.runs
            .list(query)
            .await?
            .into_iter()
            .map(RunSnapshot::try_from)
            .collect()
    }

    /// Spawns drivers for every Pending or Running run left by a previous process.
    ///
    /// Sub-runs are left to their parent's driver unless the parent is gone.
    pub async fn resume_incomplete(self: &Arc<Self>) -> Result<Vec<Uuid>, EngineError> {
        let active = self.runs.list_active().await?;
        let active_ids: HashSet<Uuid> = active.iter().map(|run| run.id).collect();

        let mut resumed = Vec::new();
        for run in active {
            if run
                .parent_run_id
                .is_some_and(|parent| active_ids.contains(&parent))
            {
                continue;
            }
            self.spawn_run(run.id);
            resumed.push(run.id);
        }
        if !resumed.is_empty() {
            info!(count = resumed.len(), "Resuming incomplete runs");
        }
        Ok(resumed)
    }

    fn claim(&self, run_id: Uuid) -> Option<RunGuard<'_>> {
        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id);
        if !inserted {
            return None;
        }
        Some(RunGuard {
            active: &self.active,
            run_id,
        })
    }

    fn is_active(&self, run_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&run_id)
    }

    async fn drive(&self, run: workflow_run::Model) -> Result<RunStatus, EngineError> {
        let run_id = run.id;
        let mut workflow = self.definitions.get(&run.definition)?.create(&run.input)?;
        let mut cursor = ReplayCursor::new(run_id, self.history.load(run_id).await?);
        let mut ctx = WorkflowContext::new(run_id, run.custom_status.clone());
        if cursor.is_replaying() {
            debug!(recorded = cursor.remaining(), "Replaying history");
        }

        let mut resumed = Resumed::Start;
        loop {
            ctx.set_replaying(cursor.is_replaying());
            let step = workflow.next(&mut ctx, resumed)?;

            let advance = match step {
                Step::Complete(result) => {
                    cursor.finish()?;
                    self.flush_status(&mut ctx).await?;
                    self.runs.complete(run_id, result).await?;
                    info!("Run completed");
                    return Ok(RunStatus::Completed);
                }
                Step::Activity(call) => {
                    match self.run_calls(run_id, &mut cursor, &mut ctx, vec![call], 1).await? {
                        Advance::Continue(mut outcomes) => match outcomes.pop() {
                            Some(outcome) => Advance::Continue(Resumed::Activity(outcome)),
                            None => {
                                return Err(EngineError::Workflow(
                                    "activity step produced no outcome".to_string(),
                                ));
                            }
                        },
                        Advance::Terminated(reason) => Advance::Terminated(reason),
                    }
                }
                Step::Batch { calls, limit } => self
                    .run_calls(run_id, &mut cursor, &mut ctx, calls, limit)
                    .await?
                    .map(Resumed::Batch),
                Step::Timer(duration) => {
                    self.run_timer(run_id, &mut cursor, &mut ctx, duration)
                        .await?
                }
                Step::SubRun { definition, input } => {
                    self.run_sub_run(run_id, &mut cursor, &mut ctx, definition, input)
                        .await?
                }
            };

            resumed = match advance {
                Advance::Continue(resumed) => resumed,
                Advance::Terminated(reason) => {
                    self.flush_status(&mut ctx).await?;
                    self.runs.mark_terminated(run_id, &reason).await?;
                    info!(reason, "Run terminated");
                    return Ok(RunStatus::Terminated);
                }
            };
        }
    }

    /// Persists pending custom status and reports a termination request.
    async fn boundary(&self, run_id: Uuid, ctx: &mut WorkflowContext) -> Result<Option<String>, EngineError> {
        if let Some(reason) = self.runs.termination_request(run_id).await? {
            return Ok(Some(reason));
        }
        self.flush_status(ctx).await?;
        Ok(None)
    }

    async fn flush_status(&self, ctx: &mut WorkflowContext) -> Result<(), EngineError> {
        if let Some(status) = ctx.take_dirty_status() {
            self.runs.set_custom_status(ctx.run_id(), Some(status)).await?;
        }
        Ok(())
    }

    /// Replays what history already holds and executes the rest.
    async fn run_calls(
        &self,
        run_id: Uuid,
        cursor: &mut ReplayCursor,
        ctx: &mut WorkflowContext,
        calls: Vec<ActivityCall>,
        limit: usize,
    ) -> Result<Advance<Vec<Outcome>>, EngineError> {
        let mut outcomes: Vec<Option<Outcome>> = vec![None; calls.len()];
        // (batch index, scheduled sequence) of calls that still need a worker
        let mut incomplete: Vec<(usize, i64)> = Vec::new();
        let mut unscheduled: Vec<usize> = Vec::new();

        for (index, call) in calls.iter().enumerate() {
            match cursor.next_activity(call)? {
                Some(replayed) => match replayed.outcome {
                    Some(outcome) => outcomes[index] = Some(outcome),
                    None => incomplete.push((index, replayed.sequence)),
                },
                None => unscheduled.push(index),
            }
        }

        if !incomplete.is_empty() || !unscheduled.is_empty() {
            if let Some(reason) = self.boundary(run_id, ctx).await? {
                return Ok(Advance::Terminated(reason));
            }

            if !unscheduled.is_empty() {
                let events = unscheduled
                    .iter()
                    .map(|&index| EventKind::ActivityScheduled {
                        name: calls[index].name.clone(),
                        input: calls[index].input.clone(),
                    })
                    .collect();
                let sequences = self.history.append(run_id, events).await?;
                incomplete.extend(unscheduled.into_iter().zip(sequences));
            }

            debug!(count = incomplete.len(), limit, "Executing activities");
            let observer = HistoryObserver {
                history: &self.history,
                run_id,
                sequences: incomplete.iter().map(|&(_, sequence)| sequence).collect(),
            };
            let work = incomplete
                .iter()
                .map(|&(index, _)| calls[index].clone())
                .collect();
            let results = self.scheduler.run_batch(work, limit, &observer).await?;
            for ((index, _), outcome) in incomplete.into_iter().zip(results) {
                outcomes[index] = Some(outcome);
            }

            // Results of work that finished after a termination request are discarded
            if let Some(reason) = self.runs.termination_request(run_id).await? {
                return Ok(Advance::Terminated(reason));
            }
        }

        let outcomes = outcomes
            .into_iter()
            .map(|outcome| {
                outcome.ok_or_else(|| EngineError::Workflow("batch slot left without outcome".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Advance::Continue(outcomes))
    }

    async fn run_timer(
        &self,
        run_id: Uuid,
        cursor: &mut ReplayCursor,
        ctx: &mut WorkflowContext,
        duration: Duration,
    ) -> Result<Advance<Resumed>, EngineError> {
        if cursor.next_timer()? {
            return Ok(Advance::Continue(Resumed::TimerFired));
        }
        if let Some(reason) = self.boundary(run_id, ctx).await? {
            return Ok(Advance::Terminated(reason));
        }

        let duration_ms = duration.as_millis() as u64;
        debug!(duration_ms, "Timer started");
        sleep(duration).await;
        self.history
            .append_one(run_id, EventKind::TimerFired { duration_ms })
            .await?;

        if let Some(reason) = self.runs.termination_request(run_id).await? {
            return Ok(Advance::Terminated(reason));
        }
        Ok(Advance::Continue(Resumed::TimerFired))
    }

    async fn run_sub_run(
        &self,
        run_id: Uuid,
        cursor: &mut ReplayCursor,
        ctx: &mut WorkflowContext,
        definition: String,
        input: Value,
    ) -> Result<Advance<Resumed>, EngineError> {
        let (sequence, child_run_id) = match cursor.next_sub_run(&definition)? {
            Some(ReplayedSubRun {
                outcome: Some(outcome),
                ..
            }) => return Ok(Advance::Continue(Resumed::SubRun(outcome))),
            Some(ReplayedSubRun {
                sequence,
                child_run_id,
                outcome: None,
            }) => {
                if let Some(reason) = self.boundary(run_id, ctx).await? {
                    return Ok(Advance::Terminated(reason));
                }
                (sequence, child_run_id)
            }
            None => {
                if let Some(reason) = self.boundary(run_id, ctx).await? {
                    return Ok(Advance::Terminated(reason));
                }
                self.definitions.get(&definition)?;
                let child_run_id = Uuid::new_v4();
                let sequence = self
                    .history
                    .append_one(
                        run_id,
                        EventKind::SubRunScheduled {
                            child_run_id,
                            definition: definition.clone(),
                            input: input.clone(),
                        },
                    )
                    .await?;
                (sequence, child_run_id)
            }
        };

        // The child row may be missing if the process died right after scheduling
        if self.runs.get(child_run_id).await?.is_none() {
            self.runs
                .create(child_run_id, &definition, input, Some(run_id))
                .await?;
        }

        info!(%child_run_id, %definition, "Driving sub-run");
        let outcome = self.drive_child(child_run_id).await?;
        self.history
            .append_one(
                run_id,
                EventKind::SubRunCompleted {
                    scheduled: sequence,
                    outcome: outcome.clone(),
                },
            )
            .await?;

        if let Some(reason) = self.runs.termination_request(run_id).await? {
            return Ok(Advance::Terminated(reason));
        }
        Ok(Advance::Continue(Resumed::SubRun(outcome)))
    }

    async fn drive_child(&self, child_run_id: Uuid) -> Result<Outcome, EngineError> {
        loop {
            let status = Box::pin(self.resume(child_run_id)).await?;
            if status.is_terminal() {
                break;
            }
            // Another driver owns the child; wait for it
            sleep(CHILD_POLL_INTERVAL).await;
        }

        let child = self.runs.require(child_run_id).await?;
        Ok(match parse_status(&child)? {
            RunStatus::Completed => Outcome::Success(child.result.unwrap_or(Value::Null)),
            RunStatus::Terminated => Outcome::failure(
                FailureKind::EngineFatal,
                format!(
                    "sub-run terminated: {}",
                    child.error.unwrap_or_else(|| "no reason given".to_string())
                ),
                1,
            ),
            _ => Outcome::failure(
                FailureKind::EngineFatal,
                child.error.unwrap_or_else(|| "sub-run failed".to_string()),
                1,
            ),
        })
    }
}
