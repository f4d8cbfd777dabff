//! Bounded retry with linear backoff.
//!
//! [`RetryPolicy::execute`] retries an arbitrary async operation;
//! [`RetryPolicy::execute_in_transaction`] wraps every attempt in its own
//! database transaction, which is rolled back when the attempt fails.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use metrics::counter;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use tokio::time::sleep;

use crate::error::Classification;

/// Retry schedule: `max_attempts` tries, attempt `n` followed by `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

/// Final failure after the policy gave up.
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Last observed error
    pub error: E,
    /// Attempts made, including the failing one
    pub attempts: u32,
    pub classification: Classification,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryFailure<E> {}

/// Body of one transactional attempt.
pub type TransactionFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// A zero attempt count is treated as one.
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self::linear(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait after the failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut, C>(&self, mut op: F, classify: C) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Classification,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let classification = classify(&error);
                    if classification == Classification::Permanent || attempt >= self.max_attempts {
                        if classification == Classification::Transient {
                            counter!("retry_exhausted_total").increment(1);
                        }
                        return Err(RetryFailure {
                            error,
                            attempts: attempt,
                            classification,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    counter!("retry_attempts_total").increment(1);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), with each attempt in a fresh transaction.
    ///
    /// The transaction commits when `op` returns `Ok` and rolls back otherwise,
    /// so a retried attempt never observes a previous attempt's writes.
    pub async fn execute_in_transaction<T, E, F, C>(
        &self,
        db: &DatabaseConnection,
        op: F,
        classify: C,
    ) -> Result<T, RetryFailure<E>>
    where
        F: for<'c> Fn(&'c DatabaseTransaction) -> TransactionFuture<'c, T, E> + Send + Sync,
        T: Send,
        E: From<DbErr> + std::error::Error + Send,
        C: Fn(&E) -> Classification,
    {
        let op = &op;
        self.execute(
            move |_attempt| async move { in_transaction(db, op).await },
            classify,
        )
        .await
    }
}

/// Runs `op` once inside a transaction, flattening sea-orm's error wrapper.
pub async fn in_transaction<T, E, F>(db: &DatabaseConnection, op: &F) -> Result<T, E>
where
    F: for<'c> Fn(&'c DatabaseTransaction) -> TransactionFuture<'c, T, E> + Send + Sync,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    db.transaction::<_, T, E>(move |txn| op(txn))
        .await
        .map_err(|err| match err {
            TransactionError::Connection(db_err) => E::from(db_err),
            TransactionError::Transaction(err) => err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::linear(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn delay_grows_linearly() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::linear(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = fast_policy(3)
            .execute(
                |attempt| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if attempt < 3 {
                            Err(IngestError::TransientUpstream("timeout".into()))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                IngestError::classification,
            )
            .await;

        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(IngestError::validation("missing id")) }
                },
                IngestError::classification,
            )
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.classification, Classification::Permanent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_transient_failure_keeps_last_error() {
        let result: Result<(), _> = fast_policy(2)
            .execute(
                |attempt| async move {
                    Err(IngestError::TransientUpstream(format!("attempt {}", attempt)))
                },
                IngestError::classification,
            )
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.classification, Classification::Transient);
        assert!(failure.error.to_string().contains("attempt 2"));
    }
}
