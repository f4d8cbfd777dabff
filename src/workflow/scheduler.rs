//! Task Scheduler
//!
//! Bounded-concurrency fan-out/fan-in over the activity registry. A batch
//! admits at most `limit` invocations at a time; every invocation also holds a
//! slot of the process-wide worker pool, so concurrent runs share capacity.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use metrics::gauge;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, instrument};

use super::EngineError;
use super::RetryPolicy;
use super::activity::{ActivityCall, ActivityRegistry, Outcome};
use crate::error::FailureKind;

/// Receives each completion as it arrives, one at a time.
#[async_trait]
pub trait BatchObserver: Send + Sync {
    async fn on_complete(&self, index: usize, outcome: &Outcome) -> Result<(), EngineError>;
}

/// Shared executor for activity invocations.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    registry: Arc<ActivityRegistry>,
    retry: RetryPolicy,
    worker_pool: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl TaskScheduler {
    pub fn new(registry: Arc<ActivityRegistry>, retry: RetryPolicy, worker_pool_size: usize) -> Self {
        Self {
            registry,
            retry,
            worker_pool: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Invocations currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count observed since creation.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Runs every call with at most `limit` in flight.
    ///
    /// Returns one outcome per call, in input order, once all are terminal.
    /// A failing call never cancels its siblings. Observer errors are reported
    /// after the whole batch has drained.
    #[instrument(skip_all, fields(batch_size = calls.len(), limit = limit))]
    pub async fn run_batch(
        &self,
        calls: Vec<ActivityCall>,
        limit: usize,
        observer: &dyn BatchObserver,
    ) -> Result<Vec<Outcome>, EngineError> {
        let total = calls.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let batch_slots = Arc::new(Semaphore::new(limit.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Outcome)>();

        // Admission runs in its own task so completions are observed while
        // later calls still wait for a slot.
        let feeder = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                for (index, call) in calls.into_iter().enumerate() {
                    let Ok(batch_permit) = batch_slots.clone().acquire_owned().await else {
                        break;
                    };
                    let scheduler = scheduler.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let _batch_permit = batch_permit;
                        let outcome = scheduler.execute(&call).await;
                        let _ = tx.send((index, outcome));
                    });
                }
            })
        };

        let mut slots: Vec<Option<Outcome>> = vec![None; total];
        let mut observer_error = None;
        while let Some((index, outcome)) = rx.recv().await {
            debug!(index, success = outcome.is_success(), "Invocation finished");
            if observer_error.is_none()
                && let Err(err) = observer.on_complete(index, &outcome).await
            {
                observer_error = Some(err);
            }
            slots[index] = Some(outcome);
        }
        let _ = feeder.await;

        let mut outcomes = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            let outcome = match slot {
                Some(outcome) => outcome,
                None => {
                    // Worker task panicked before reporting
                    let outcome =
                        Outcome::failure(FailureKind::EngineFatal, "activity task aborted", 0);
                    if observer_error.is_none()
                        && let Err(err) = observer.on_complete(index, &outcome).await
                    {
                        observer_error = Some(err);
                    }
                    outcome
                }
            };
            outcomes.push(outcome);
        }

        match observer_error {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }

    async fn execute(&self, call: &ActivityCall) -> Outcome {
        let Ok(_pool_permit) = self.worker_pool.acquire().await else {
            return Outcome::failure(FailureKind::EngineFatal, "worker pool closed", 0);
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        gauge!("activities_in_flight").set(current as f64);

        let outcome = self.registry.invoke(call, &self.retry).await;

        let current = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("activities_in_flight").set(current as f64);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::workflow::activity::Activity;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Sleeps for `input.sleep_ms`, tracking its own peak concurrency.
    struct Sleeper {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Activity for Sleeper {
        fn name(&self) -> &'static str {
            "sleep"
        }

        async fn execute(&self, input: Value) -> Result<Value, IngestError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let ms = input["sleep_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if input["fail"].as_bool().unwrap_or(false) {
                return Err(IngestError::validation("asked to fail"));
            }
            Ok(input["tag"].clone())
        }
    }

    fn scheduler_with(sleeper: Arc<Sleeper>, pool: usize) -> TaskScheduler {
        let mut registry = ActivityRegistry::new();
        registry.register(sleeper);
        TaskScheduler::new(
            Arc::new(registry),
            RetryPolicy::linear(1, Duration::ZERO),
            pool,
        )
    }

    fn sleeper() -> Arc<Sleeper> {
        Arc::new(Sleeper {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    fn call(tag: &str, sleep_ms: u64) -> ActivityCall {
        ActivityCall::new("sleep", json!({"tag": tag, "sleep_ms": sleep_ms}))
    }

    struct NoopObserver;

    #[async_trait]
    impl BatchObserver for NoopObserver {
        async fn on_complete(&self, _index: usize, _outcome: &Outcome) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl BatchObserver for Recorder {
        async fn on_complete(&self, index: usize, _outcome: &Outcome) -> Result<(), EngineError> {
            self.seen.lock().await.push(index);
            Ok(())
        }
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_limit() {
        let activity = sleeper();
        let scheduler = scheduler_with(activity.clone(), 32);
        let calls = (0..12).map(|i| call(&i.to_string(), 20)).collect();

        let outcomes = scheduler.run_batch(calls, 3, &NoopObserver).await.unwrap();

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.iter().all(Outcome::is_success));
        assert!(activity.peak.load(Ordering::SeqCst) <= 3);
        assert!(scheduler.peak_in_flight() <= 3);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn worker_pool_caps_concurrency_across_batches() {
        let activity = sleeper();
        let scheduler = scheduler_with(activity.clone(), 2);

        let first = scheduler.clone();
        let second = scheduler.clone();
        let (a, b) = tokio::join!(
            async move {
                first
                    .run_batch((0..4).map(|_| call("a", 15)).collect(), 4, &NoopObserver)
                    .await
            },
            async move {
                second
                    .run_batch((0..4).map(|_| call("b", 15)).collect(), 4, &NoopObserver)
                    .await
            },
        );

        assert_eq!(a.unwrap().len(), 4);
        assert_eq!(b.unwrap().len(), 4);
        assert!(activity.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let scheduler = scheduler_with(sleeper(), 8);
        let calls = vec![call("a", 60), call("b", 30), call("c", 1)];
        let recorder = Recorder::default();

        let outcomes = scheduler.run_batch(calls, 3, &recorder).await.unwrap();

        assert_eq!(
            outcomes,
            vec![
                Outcome::Success(json!("a")),
                Outcome::Success(json!("b")),
                Outcome::Success(json!("c")),
            ]
        );
        // c finished first, the observer sees completion order
        assert_eq!(recorder.seen.lock().await.first(), Some(&2));
        assert_eq!(recorder.seen.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn failure_does_not_cancel_siblings() {
        let scheduler = scheduler_with(sleeper(), 8);
        let calls = vec![
            call("ok-1", 10),
            ActivityCall::new("sleep", json!({"tag": "bad", "fail": true})),
            call("ok-2", 20),
        ];

        let outcomes = scheduler.run_batch(calls, 2, &NoopObserver).await.unwrap();

        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert_eq!(outcomes[2], Outcome::Success(json!("ok-2")));
    }

    #[tokio::test]
    async fn single_calls_share_the_worker_pool() {
        let activity = sleeper();
        let scheduler = scheduler_with(activity.clone(), 1);

        let (a, b, c) = tokio::join!(
            scheduler.run_batch(vec![call("a", 15)], 1, &NoopObserver),
            scheduler.run_batch(vec![call("b", 15)], 1, &NoopObserver),
            scheduler.run_batch(vec![call("c", 15)], 1, &NoopObserver),
        );

        for outcomes in [a, b, c] {
            assert_eq!(outcomes.unwrap().len(), 1);
        }
        assert_eq!(activity.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() {
        let scheduler = scheduler_with(sleeper(), 1);
        let outcomes = scheduler.run_batch(Vec::new(), 5, &NoopObserver).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
