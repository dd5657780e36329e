//! Retry-on-conflict executor for units of work.
//!
//! [`run_in_tx`] opens a serializable unit, hands it to the caller's closure and
//! commits. Only a commit that fails with [`TxError::ConcurrentTransaction`] is
//! retried, with a fresh unit and a fresh closure invocation. Closure errors,
//! begin failures and other commit failures are returned immediately.
//!
//! The closure may run more than once per call, so it must not produce side
//! effects outside the database (notifications, HTTP calls) before the call
//! has returned successfully.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Beginner, TxError, Unit};

/// Attempts made when the caller does not override them.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Future returned by a unit-of-work closure; borrows the unit for `'u`.
pub type UnitFuture<'u, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'u>>;

/// Retry policy for a single [`run_in_tx`] call.
///
/// Build one per call; the optional deadline is absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    attempts: u32,
    deadline: Option<Instant>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            deadline: None,
        }
    }
}

impl RetrySettings {
    /// Override the attempt count. Non-positive values keep the current value.
    pub fn with_attempts(mut self, attempts: i64) -> Self {
        if attempts > 0 {
            self.attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        }
        self
    }

    /// Fail with [`TxError::Cancelled`] once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Run `work` inside a serializable unit from `beginner`, retrying on commit
/// conflicts.
///
/// On success exactly one attempt committed. When every attempt conflicts the
/// result is `TxError::ConcurrentTransaction` converted into `E`.
pub async fn run_in_tx<B, T, E, F>(beginner: &B, settings: RetrySettings, mut work: F) -> Result<T, E>
where
    B: Beginner + ?Sized,
    T: Send,
    E: From<TxError> + Send,
    F: for<'u> FnMut(&'u mut B::Unit) -> UnitFuture<'u, T, E> + Send,
{
    let attempts = settings.attempts();
    let deadline = settings.deadline();

    for attempt in 1..=attempts {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(TxError::Cancelled(format!("deadline elapsed before attempt {attempt}")).into());
        }

        let mut unit = bounded(deadline, "begin", beginner.begin_tx()).await??;

        let value = match bounded(deadline, "work", work(&mut unit)).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                abandon(&mut unit).await;
                return Err(err);
            }
            Err(cancelled) => {
                abandon(&mut unit).await;
                return Err(cancelled.into());
            }
        };

        match bounded(deadline, "commit", unit.commit()).await {
            Ok(Ok(())) => {
                if attempt > 1 {
                    debug!(attempt, "transaction committed after retry");
                }
                return Ok(value);
            }
            Ok(Err(err)) if err.is_conflict() => {
                debug!(attempt, attempts, "commit conflicted with a concurrent transaction");
            }
            Ok(Err(err)) | Err(err) => {
                abandon(&mut unit).await;
                return Err(err.into());
            }
        }
    }

    warn!(attempts, "giving up after repeated commit conflicts");
    Err(TxError::ConcurrentTransaction.into())
}

async fn bounded<F>(deadline: Option<Instant>, step: &'static str, fut: F) -> Result<F::Output, TxError>
where
    F: Future,
{
    match deadline {
        None => Ok(fut.await),
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| TxError::Cancelled(format!("deadline elapsed during {step}"))),
    }
}

async fn abandon<U: Unit>(unit: &mut U) {
    if let Err(err) = unit.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::tx::InMemoryBeginner;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Tx(TxError),
        Domain(&'static str),
    }

    impl From<TxError> for TestError {
        fn from(err: TxError) -> Self {
            Self::Tx(err)
        }
    }

    /// Beginner whose commits fail according to a script.
    #[derive(Debug, Default)]
    struct Script {
        begins: AtomicUsize,
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
        conflicts_left: AtomicUsize,
        commit_error: Mutex<Option<TxError>>,
        begin_error: Mutex<Option<TxError>>,
    }

    #[derive(Debug, Clone, Default)]
    struct ScriptedBeginner(Arc<Script>);

    struct ScriptedUnit {
        script: Arc<Script>,
        real: bool,
    }

    impl ScriptedBeginner {
        fn conflicting(times: usize) -> Self {
            let b = Self::default();
            b.0.conflicts_left.store(times, SeqCst);
            b
        }
    }

    #[async_trait::async_trait]
    impl Unit for ScriptedUnit {
        fn is_transactional(&self) -> bool {
            self.real
        }

        async fn commit(&mut self) -> Result<(), TxError> {
            if !self.real {
                return Ok(());
            }
            if self.script.conflicts_left.load(SeqCst) > 0 {
                self.script.conflicts_left.fetch_sub(1, SeqCst);
                return Err(TxError::ConcurrentTransaction);
            }
            if let Some(err) = self.script.commit_error.lock().unwrap().clone() {
                return Err(err);
            }
            self.script.commits.fetch_add(1, SeqCst);
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), TxError> {
            self.script.rollbacks.fetch_add(1, SeqCst);
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Beginner for ScriptedBeginner {
        type Unit = ScriptedUnit;

        async fn begin_tx(&self) -> Result<ScriptedUnit, TxError> {
            if let Some(err) = self.0.begin_error.lock().unwrap().clone() {
                return Err(err);
            }
            self.0.begins.fetch_add(1, SeqCst);
            Ok(ScriptedUnit {
                script: self.0.clone(),
                real: true,
            })
        }

        fn no_tx(&self) -> ScriptedUnit {
            ScriptedUnit {
                script: self.0.clone(),
                real: false,
            }
        }
    }

    async fn run_counting(
        beginner: &ScriptedBeginner,
        settings: RetrySettings,
        outcome: Result<u32, TestError>,
    ) -> (Result<u32, TestError>, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<u32, TestError> = run_in_tx(beginner, settings, move |_unit| {
            let counter = counter.clone();
            let outcome = outcome.clone();
            Box::pin(async move {
                counter.fetch_add(1, SeqCst);
                outcome
            })
        })
        .await;
        (result, calls.load(SeqCst))
    }

    #[tokio::test]
    async fn commits_after_fewer_conflicts_than_attempts() {
        for n in 1..=DEFAULT_ATTEMPTS as usize {
            let beginner = ScriptedBeginner::conflicting(n - 1);
            let (result, calls) = run_counting(&beginner, RetrySettings::default(), Ok(7)).await;

            assert_eq!(result, Ok(7), "attempt {n}");
            assert_eq!(calls, n);
            assert_eq!(beginner.0.begins.load(SeqCst), n);
            assert_eq!(beginner.0.commits.load(SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn closure_error_is_returned_without_retry() {
        let beginner = ScriptedBeginner::default();
        let (result, calls) = run_counting(
            &beginner,
            RetrySettings::default(),
            Err(TestError::Domain("not found")),
        )
        .await;

        assert_eq!(result, Err(TestError::Domain("not found")));
        assert_eq!(calls, 1);
        assert_eq!(beginner.0.rollbacks.load(SeqCst), 1);
        assert_eq!(beginner.0.commits.load(SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_attempts_report_concurrent_transaction() {
        let beginner = ScriptedBeginner::conflicting(usize::MAX);
        let (result, calls) = run_counting(&beginner, RetrySettings::default(), Ok(1)).await;

        assert_eq!(result, Err(TestError::Tx(TxError::ConcurrentTransaction)));
        assert_eq!(calls, 3);
        assert_eq!(beginner.0.commits.load(SeqCst), 0);
    }

    #[tokio::test]
    async fn attempt_override_is_honoured() {
        let beginner = ScriptedBeginner::conflicting(4);
        let (result, calls) =
            run_counting(&beginner, RetrySettings::default().with_attempts(5), Ok(1)).await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls, 5);
    }

    #[test]
    fn non_positive_attempts_keep_default() {
        assert_eq!(RetrySettings::default().with_attempts(0).attempts(), 3);
        assert_eq!(RetrySettings::default().with_attempts(-2).attempts(), 3);
        assert_eq!(RetrySettings::default().with_attempts(1).attempts(), 1);
    }

    #[tokio::test]
    async fn other_commit_errors_are_not_retried() {
        let beginner = ScriptedBeginner::default();
        *beginner.0.commit_error.lock().unwrap() = Some(TxError::Commit("connection reset".into()));

        let (result, calls) = run_counting(&beginner, RetrySettings::default(), Ok(1)).await;

        assert_eq!(
            result,
            Err(TestError::Tx(TxError::Commit("connection reset".into())))
        );
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn begin_failure_is_surfaced_before_running_work() {
        let beginner = ScriptedBeginner::default();
        *beginner.0.begin_error.lock().unwrap() = Some(TxError::Begin("pool timed out".into()));

        let (result, calls) = run_counting(&beginner, RetrySettings::default(), Ok(1)).await;

        assert_eq!(result, Err(TestError::Tx(TxError::Begin("pool timed out".into()))));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn elapsed_deadline_cancels_before_first_attempt() {
        let beginner = ScriptedBeginner::default();
        let settings = RetrySettings::default().with_deadline(Instant::now());

        let (result, calls) = run_counting(&beginner, settings, Ok(1)).await;

        assert!(matches!(result, Err(TestError::Tx(TxError::Cancelled(_)))));
        assert_eq!(calls, 0);
        assert_eq!(beginner.0.begins.load(SeqCst), 0);
    }

    #[tokio::test]
    async fn deadline_during_work_rolls_back_and_does_not_retry() {
        let beginner = ScriptedBeginner::default();
        let settings = RetrySettings::default().with_timeout(Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<u32, TestError> = run_in_tx(&beginner, settings, move |_unit| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<u32, TestError>(1)
            })
        })
        .await;

        assert!(matches!(result, Err(TestError::Tx(TxError::Cancelled(_)))));
        assert_eq!(calls.load(SeqCst), 1);
        assert_eq!(beginner.0.rollbacks.load(SeqCst), 1);
        assert_eq!(beginner.0.commits.load(SeqCst), 0);
    }

    #[tokio::test]
    async fn lost_race_is_retried_against_fresh_state() {
        let db = InMemoryBeginner::new(0u64);
        let rival = db.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<u64, TestError> = run_in_tx(&db, RetrySettings::default(), move |unit| {
            let first = counter.fetch_add(1, SeqCst) == 0;
            let rival = rival.clone();
            Box::pin(async move {
                let current = *unit.state();
                if first {
                    // Another writer commits between our read and our commit.
                    let mut other = rival.begin_tx().await?;
                    *other.state_mut()? += 10;
                    other.commit().await?;
                }
                *unit.state_mut()? = current + 1;
                Ok::<u64, TestError>(current + 1)
            })
        })
        .await;

        assert_eq!(result, Ok(11));
        assert_eq!(calls.load(SeqCst), 2);
        assert_eq!(db.snapshot().unwrap(), 11);
    }

    #[tokio::test]
    async fn failed_work_leaves_no_partial_effects() {
        let db = InMemoryBeginner::new(5u64);

        let result: Result<(), TestError> = run_in_tx(&db, RetrySettings::default(), |unit| {
            Box::pin(async move {
                *unit.state_mut()? = 99;
                Err::<(), TestError>(TestError::Domain("business rule"))
            })
        })
        .await;

        assert_eq!(result, Err(TestError::Domain("business rule")));
        assert_eq!(db.snapshot().unwrap(), 5);
    }
}
