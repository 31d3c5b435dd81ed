//! Deadlines and cancellation for network-bound operations.
//!
//! A `Cancel` races an operation against an optional deadline and an
//! optional `CancellationToken`. When either fires the operation's future is
//! dropped, which returns any borrowed connection to the pool. What the
//! server did with a half-sent statement is indeterminate.
//!
//! Loops that keep a protocol open across awaits (COPY) call
//! [`Cancel::check`] between steps so they can close the exchange
//! themselves instead of being dropped mid-flight.

use crate::error::{DbError, DbResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Cancel {
    deadline: Option<Instant>,
    /// Length of the deadline when it was set, for error reporting.
    budget: Duration,
    token: Option<CancellationToken>,
}

impl Cancel {
    /// No deadline and no token; operation defaults still apply.
    pub fn none() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let mut cancel = Self::none();
        cancel.set_deadline(timeout);
        cancel
    }

    /// Cancelled when `token` is cancelled.
    pub fn token(token: CancellationToken) -> Self {
        Self::none().with_token(token)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self.budget = deadline.saturating_duration_since(Instant::now());
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Fill in a deadline of `timeout` from now when none was supplied.
    pub fn or_timeout(&self, timeout: Duration) -> Self {
        let mut cancel = self.clone();
        if cancel.deadline.is_none() {
            cancel.set_deadline(timeout);
        }
        cancel
    }

    fn set_deadline(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
        self.budget = timeout;
    }

    fn timed_out(&self, operation: &str) -> DbError {
        DbError::timeout(operation, self.budget)
    }

    /// Fail with `Cancelled` or `Timeout` if either has already fired.
    pub fn check(&self, operation: &str) -> DbResult<()> {
        if self.is_cancelled() {
            return Err(DbError::cancelled(operation));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(self.timed_out(operation));
        }
        Ok(())
    }

    /// Run `fut`, failing with `Timeout` or `Cancelled` if it does not finish first.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        if self.is_cancelled() {
            return Err(DbError::cancelled(operation));
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => match timeout_at(deadline, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(self.timed_out(operation)),
                },
                None => fut.await,
            }
        };

        match &self.token {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(DbError::cancelled(operation)),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let result = Cancel::none().run("noop", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deadline_times_out() {
        let cancel = Cancel::after(Duration::from_millis(10));
        let result: DbResult<()> = cancel
            .run("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        match result {
            Err(DbError::Timeout { timeout_ms, .. }) => assert_eq!(timeout_ms, 10),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_between_steps() {
        assert!(Cancel::none().check("step").is_ok());
        assert!(Cancel::after(Duration::from_secs(60)).check("step").is_ok());

        let expired = Cancel::after(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(matches!(expired.check("step"), Err(DbError::Timeout { .. })));

        let token = CancellationToken::new();
        let cancel = Cancel::token(token.clone());
        token.cancel();
        assert!(matches!(cancel.check("step"), Err(DbError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_token_cancels() {
        let token = CancellationToken::new();
        let cancel = Cancel::token(token.clone());
        let handle = tokio::spawn(async move {
            cancel
                .run("sleep", async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
                .await
        });
        token.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(DbError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_operation() {
        let token = CancellationToken::new();
        token.cancel();
        let result: DbResult<()> = Cancel::token(token)
            .run("never", async { panic!("operation must not run") })
            .await;
        assert!(matches!(result, Err(DbError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_or_timeout_keeps_explicit_deadline() {
        let explicit = Cancel::after(Duration::from_secs(1));
        let kept = explicit.or_timeout(Duration::from_secs(100));
        assert_eq!(kept.deadline(), explicit.deadline());

        let filled = Cancel::none().or_timeout(Duration::from_secs(100));
        assert!(filled.deadline().is_some());
    }
}
