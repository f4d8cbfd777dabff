//! Engine behaviour with small purpose-built workflows.

mod test_utils;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use uuid::Uuid;

use showsync::error::IngestError;
use showsync::workflow::{
    Activity, ActivityCall, ActivityRegistry, DefinitionRegistry, EngineError, EventKind, Outcome,
    Resumed, RunSnapshot, RunStatus, Step, Workflow, WorkflowContext, WorkflowDefinition,
    WorkflowEngine,
};
use test_utils::{fast_workflow_config, setup_test_db};

/// `{n}` -> `{n: n * 10}`
struct Multiply {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Activity for Multiply {
    fn name(&self) -> &'static str {
        "multiply"
    }

    async fn execute(&self, input: Value) -> Result<Value, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = input["n"]
            .as_i64()
            .ok_or_else(|| IngestError::validation("n is required"))?;
        Ok(json!({ "n": n * 10 }))
    }
}

/// Two sequential activities, then the sum.
struct Pipeline {
    state: u8,
    total: i64,
    replay_log: Arc<Mutex<Vec<bool>>>,
}

impl Workflow for Pipeline {
    fn next(&mut self, ctx: &mut WorkflowContext, resumed: Resumed) -> Result<Step, EngineError> {
        self.replay_log
            .lock()
            .unwrap()
            .push(ctx.is_replaying());

        match (self.state, resumed) {
            (0, Resumed::Start) => {
                ctx.set_custom_status("step 1");
                self.state = 1;
                Ok(Step::Activity(ActivityCall::new("multiply", json!({ "n": 1 }))))
            }
            (1, Resumed::Activity(outcome)) => {
                self.total += outcome.decode::<Value>().map_err(|f| EngineError::Workflow(f.cause))?["n"]
                    .as_i64()
                    .unwrap_or_default();
                ctx.set_custom_status("step 2");
                self.state = 2;
                Ok(Step::Activity(ActivityCall::new("multiply", json!({ "n": 2 }))))
            }
            (2, Resumed::Activity(outcome)) => {
                self.total += outcome.decode::<Value>().map_err(|f| EngineError::Workflow(f.cause))?["n"]
                    .as_i64()
                    .unwrap_or_default();
                Ok(Step::Complete(json!({ "total": self.total })))
            }
            (state, resumed) => Err(EngineError::unexpected(&state.to_string(), &resumed)),
        }
    }
}

struct PipelineDefinition {
    replay_log: Arc<Mutex<Vec<bool>>>,
}

impl WorkflowDefinition for PipelineDefinition {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn create(&self, _input: &Value) -> Result<Box<dyn Workflow>, EngineError> {
        Ok(Box::new(Pipeline {
            state: 0,
            total: 0,
            replay_log: Arc::clone(&self.replay_log),
        }))
    }
}

/// Runs `pipeline` as a child and reports its outcome.
struct Parent {
    started: bool,
}

impl Workflow for Parent {
    fn next(&mut self, _ctx: &mut WorkflowContext, resumed: Resumed) -> Result<Step, EngineError> {
        match (self.started, resumed) {
            (false, Resumed::Start) => {
                self.started = true;
                Ok(Step::SubRun {
                    definition: "pipeline".to_string(),
                    input: json!({}),
                })
            }
            (true, Resumed::SubRun(Outcome::Success(child))) => {
                Ok(Step::Complete(json!({ "child": child })))
            }
            (true, Resumed::SubRun(Outcome::Failure(failure))) => {
                Ok(Step::Complete(json!({ "child_error": failure.cause })))
            }
            (_, resumed) => Err(EngineError::unexpected("parent", &resumed)),
        }
    }
}

struct ParentDefinition;

impl WorkflowDefinition for ParentDefinition {
    fn name(&self) -> &'static str {
        "parent"
    }

    fn create(&self, _input: &Value) -> Result<Box<dyn Workflow>, EngineError> {
        Ok(Box::new(Parent { started: false }))
    }
}

/// Fans out `multiply` over 1..=5, then a short timer.
struct FanOut {
    state: u8,
    results: Vec<Outcome>,
}

impl Workflow for FanOut {
    fn next(&mut self, _ctx: &mut WorkflowContext, resumed: Resumed) -> Result<Step, EngineError> {
        match (self.state, resumed) {
            (0, Resumed::Start) => {
                self.state = 1;
                let mut calls: Vec<ActivityCall> = (1..=5)
                    .map(|n| ActivityCall::new("multiply", json!({ "n": n })))
                    .collect();
                calls.push(ActivityCall::new("multiply", json!({})));
                Ok(Step::Batch { calls, limit: 2 })
            }
            (1, Resumed::Batch(outcomes)) => {
                self.state = 2;
                self.results = outcomes;
                Ok(Step::Timer(Duration::from_millis(5)))
            }
            (2, Resumed::TimerFired) => {
                let values: Vec<Value> = self
                    .results
                    .iter()
                    .map(|outcome| match outcome {
                        Outcome::Success(value) => value["n"].clone(),
                        Outcome::Failure(failure) => json!(format!("{:?}", failure.kind)),
                    })
                    .collect();
                Ok(Step::Complete(json!(values)))
            }
            (_, resumed) => Err(EngineError::unexpected("fan_out", &resumed)),
        }
    }
}

struct FanOutDefinition;

impl WorkflowDefinition for FanOutDefinition {
    fn name(&self) -> &'static str {
        "fan_out"
    }

    fn create(&self, _input: &Value) -> Result<Box<dyn Workflow>, EngineError> {
        Ok(Box::new(FanOut {
            state: 0,
            results: Vec::new(),
        }))
    }
}

struct Harness {
    engine: Arc<WorkflowEngine>,
    calls: Arc<AtomicU32>,
    replay_log: Arc<Mutex<Vec<bool>>>,
    _db: DatabaseConnection,
}

async fn harness() -> Harness {
    let db = setup_test_db().await.unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let replay_log = Arc::new(Mutex::new(Vec::new()));

    let mut activities = ActivityRegistry::new();
    activities.register(Arc::new(Multiply {
        calls: Arc::clone(&calls),
    }));

    let mut definitions = DefinitionRegistry::new();
    definitions.register(Arc::new(PipelineDefinition {
        replay_log: Arc::clone(&replay_log),
    }));
    definitions.register(Arc::new(ParentDefinition));
    definitions.register(Arc::new(FanOutDefinition));

    let engine = WorkflowEngine::new(db.clone(), definitions, activities, &fast_workflow_config());
    Harness {
        engine: Arc::new(engine),
        calls,
        replay_log,
        _db: db,
    }
}

async fn wait_for_terminal(engine: &WorkflowEngine, run_id: Uuid) -> RunSnapshot {
    for _ in 0..300 {
        let snapshot = engine.status(run_id).await.unwrap();
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish", run_id);
}

#[tokio::test]
async fn run_completes_with_result_and_custom_status() {
    let h = harness().await;

    let snapshot = h.engine.run_to_completion("pipeline", json!({})).await.unwrap();

    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(snapshot.result, Some(json!({ "total": 30 })));
    assert_eq!(snapshot.custom_status.as_deref(), Some("step 2"));
    assert!(snapshot.started_at.is_some());
    assert!(snapshot.finished_at.is_some());
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);

    let events = h.engine.history().load(snapshot.id).await.unwrap();
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0].kind, EventKind::ActivityScheduled { .. }));
    assert_eq!(events[1].kind.completes(), Some(0));
}

#[tokio::test]
async fn resume_replays_recorded_results_without_re_executing() {
    let h = harness().await;
    let run_id = h.engine.start_run("pipeline", json!({})).await.unwrap();

    // A previous driver got as far as completing the first activity
    h.engine
        .history()
        .append(
            run_id,
            vec![
                EventKind::ActivityScheduled {
                    name: "multiply".to_string(),
                    input: json!({ "n": 1 }),
                },
                EventKind::ActivityCompleted {
                    scheduled: 0,
                    result: json!({ "n": 10 }),
                },
            ],
        )
        .await
        .unwrap();

    let status = h.engine.resume(run_id).await.unwrap();

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*h.replay_log.lock().unwrap(), vec![true, false, false]);
    let snapshot = h.engine.status(run_id).await.unwrap();
    assert_eq!(snapshot.result, Some(json!({ "total": 30 })));
}

#[tokio::test]
async fn scheduled_but_unfinished_activity_runs_again() {
    let h = harness().await;
    let run_id = h.engine.start_run("pipeline", json!({})).await.unwrap();
    h.engine
        .history()
        .append_one(
            run_id,
            EventKind::ActivityScheduled {
                name: "multiply".to_string(),
                input: json!({ "n": 1 }),
            },
        )
        .await
        .unwrap();

    h.engine.resume(run_id).await.unwrap();

    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    // The recorded schedule is reused, not duplicated
    let events = h.engine.history().load(run_id).await.unwrap();
    let scheduled = events
        .iter()
        .filter(|event| matches!(event.kind, EventKind::ActivityScheduled { .. }))
        .count();
    assert_eq!(scheduled, 2);
}

#[tokio::test]
async fn diverging_history_fails_the_run() {
    let h = harness().await;
    let run_id = h.engine.start_run("pipeline", json!({})).await.unwrap();
    h.engine
        .history()
        .append_one(
            run_id,
            EventKind::ActivityScheduled {
                name: "something_else".to_string(),
                input: json!({}),
            },
        )
        .await
        .unwrap();

    let status = h.engine.resume(run_id).await.unwrap();

    assert_eq!(status, RunStatus::Failed);
    let snapshot = h.engine.status(run_id).await.unwrap();
    assert!(snapshot.error.unwrap().contains("nondeterministic"));
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn startup_recovery_drives_runs_left_pending() {
    let h = harness().await;
    let run_id = h.engine.start_run("pipeline", json!({})).await.unwrap();

    let resumed = h.engine.resume_incomplete().await.unwrap();
    assert_eq!(resumed, vec![run_id]);

    let snapshot = wait_for_terminal(&h.engine, run_id).await;
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn resuming_a_terminal_run_is_a_no_op() {
    let h = harness().await;
    let snapshot = h.engine.run_to_completion("pipeline", json!({})).await.unwrap();

    let status = h.engine.resume(snapshot.id).await.unwrap();

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.engine.status(snapshot.id).await.unwrap(), snapshot);
}

#[tokio::test]
async fn pending_run_terminates_before_any_activity() {
    let h = harness().await;
    let run_id = h.engine.start_run("pipeline", json!({})).await.unwrap();

    assert!(h.engine.terminate(run_id, "operator stop").await.unwrap());
    let snapshot = wait_for_terminal(&h.engine, run_id).await;

    assert_eq!(snapshot.status, RunStatus::Terminated);
    assert_eq!(snapshot.error.as_deref(), Some("operator stop"));
    assert!(snapshot.terminate_requested);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);

    // Already terminal
    assert!(!h.engine.terminate(run_id, "again").await.unwrap());
}

#[tokio::test]
async fn terminating_an_unknown_run_is_not_found() {
    let h = harness().await;
    let err = h.engine.terminate(Uuid::new_v4(), "nope").await.unwrap_err();
    assert!(matches!(err, EngineError::RunNotFound(_)));
}

#[tokio::test]
async fn terminate_all_reports_only_active_runs() {
    let h = harness().await;
    let finished = h.engine.run_to_completion("pipeline", json!({})).await.unwrap();
    let first = h.engine.start_run("pipeline", json!({})).await.unwrap();
    let second = h.engine.start_run("fan_out", json!({})).await.unwrap();

    let report = h.engine.terminate_all_active("shutdown").await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.terminated.len(), 2);
    assert!(report.terminated.contains(&first));
    assert!(report.terminated.contains(&second));
    assert!(!report.terminated.contains(&finished.id));
    for run_id in [first, second] {
        assert_eq!(
            wait_for_terminal(&h.engine, run_id).await.status,
            RunStatus::Terminated
        );
    }
}

#[tokio::test]
async fn sub_run_result_flows_back_to_the_parent() {
    let h = harness().await;

    let parent = h.engine.run_to_completion("parent", json!({})).await.unwrap();

    assert_eq!(parent.status, RunStatus::Completed);
    assert_eq!(parent.result, Some(json!({ "child": { "total": 30 } })));

    let runs = h
        .engine
        .list_runs(&showsync::workflow::RunQuery {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    let child = runs
        .iter()
        .find(|run| run.parent_run_id == Some(parent.id))
        .expect("child run recorded");
    assert_eq!(child.definition, "pipeline");
    assert_eq!(child.status, RunStatus::Completed);
}

#[tokio::test]
async fn batch_outcomes_keep_input_order_and_failures_are_values() {
    let h = harness().await;

    let snapshot = h.engine.run_to_completion("fan_out", json!({})).await.unwrap();

    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(
        snapshot.result,
        Some(json!([10, 20, 30, 40, 50, "Validation"]))
    );
    let events = h.engine.history().load(snapshot.id).await.unwrap();
    assert!(
        events
            .iter()
            .any(|event| matches!(event.kind, EventKind::TimerFired { duration_ms: 5 }))
    );
}

#[tokio::test]
async fn unknown_definition_is_rejected_at_start() {
    let h = harness().await;
    let err = h.engine.start_run("missing", json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownDefinition(name) if name == "missing"));
}
