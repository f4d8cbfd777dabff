//! Activity contract, registry and invocation outcomes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::RetryPolicy;
use crate::error::{FailureKind, IngestError};

/// A side-effecting unit of work executed on the worker pool.
///
/// Activities run at least once per scheduling decision, so implementations
/// must be idempotent.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Registry key recorded in history
    fn name(&self) -> &'static str;

    async fn execute(&self, input: Value) -> Result<Value, IngestError>;
}

/// Typed terminal failure of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityFailure {
    pub kind: FailureKind,
    pub cause: String,
    pub attempts: u32,
}

impl fmt::Display for ActivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.cause)
    }
}

/// Terminal result of an activity or sub-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(ActivityFailure),
}

impl Outcome {
    pub fn failure(kind: FailureKind, cause: impl Into<String>, attempts: u32) -> Self {
        Outcome::Failure(ActivityFailure {
            kind,
            cause: cause.into(),
            attempts,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn into_result(self) -> Result<Value, ActivityFailure> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }

    /// Decodes a successful result; a payload that does not fit `T` becomes
    /// a Validation failure.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ActivityFailure> {
        let value = self.into_result()?;
        serde_json::from_value(value).map_err(|err| ActivityFailure {
            kind: FailureKind::Validation,
            cause: format!("unexpected activity result: {}", err),
            attempts: 1,
        })
    }
}

/// Request to run activity `name` with `input`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCall {
    pub name: String,
    pub input: Value,
}

impl ActivityCall {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// Name-keyed set of activities available to workflows.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations under the same name replace earlier ones.
    pub fn register(&mut self, activity: Arc<dyn Activity>) {
        self.activities.insert(activity.name().to_string(), activity);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.activities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs one invocation through `retry` and folds the result into an [`Outcome`].
    #[instrument(skip(self, call, retry), fields(activity = %call.name))]
    pub async fn invoke(&self, call: &ActivityCall, retry: &RetryPolicy) -> Outcome {
        let Some(activity) = self.get(&call.name) else {
            tracing::error!("Activity is not registered");
            counter!("activity_failures_total", "activity" => call.name.clone(), "kind" => "engine_fatal")
                .increment(1);
            return Outcome::failure(
                FailureKind::EngineFatal,
                format!("unknown activity '{}'", call.name),
                0,
            );
        };

        let started = Instant::now();
        let result = retry
            .execute(
                |_attempt| activity.execute(call.input.clone()),
                IngestError::classification,
            )
            .await;
        histogram!("activity_duration_seconds", "activity" => call.name.clone())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                counter!("activity_success_total", "activity" => call.name.clone()).increment(1);
                Outcome::Success(value)
            }
            Err(failure) => {
                let kind = failure.error.kind();
                tracing::warn!(
                    ?kind,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Activity failed"
                );
                counter!(
                    "activity_failures_total",
                    "activity" => call.name.clone(),
                    "kind" => format!("{:?}", kind)
                )
                .increment(1);
                Outcome::failure(kind, failure.error.to_string(), failure.attempts)
            }
        }
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activities", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl Activity for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn execute(&self, input: Value) -> Result<Value, IngestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                return Err(IngestError::TransientUpstream("503".into()));
            }
            Ok(json!({"echo": input, "call": call}))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::linear(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn unknown_activity_fails_without_attempts() {
        let registry = ActivityRegistry::new();
        let outcome = registry
            .invoke(&ActivityCall::new("missing", json!({})), &policy())
            .await;

        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::EngineFatal);
        assert_eq!(failure.attempts, 0);
    }

    #[tokio::test]
    async fn transient_failures_are_absorbed_by_retry() {
        let mut registry = ActivityRegistry::new();
        registry.register(Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_times: 2,
        }));

        let outcome = registry
            .invoke(&ActivityCall::new("flaky", json!(7)), &policy())
            .await;
        assert_eq!(outcome, Outcome::Success(json!({"echo": 7, "call": 3})));
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempts() {
        let mut registry = ActivityRegistry::new();
        registry.register(Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_times: 10,
        }));

        let failure = registry
            .invoke(&ActivityCall::new("flaky", json!(null)), &policy())
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::TransientUpstream);
        assert_eq!(failure.attempts, 3);
    }

    #[test]
    fn decode_maps_shape_mismatch_to_validation() {
        let failure = Outcome::Success(json!("text")).decode::<u32>().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Validation);
    }
}
