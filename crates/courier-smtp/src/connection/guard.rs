//! Deadline and cancellation handling for blocking network operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Bounds every network operation of a session.
///
/// An operation is aborted when the absolute `deadline` passes, when the
/// per-operation timeout elapses, or when the cancellation token fires,
/// whichever happens first.
#[derive(Debug, Clone, Default)]
pub struct IoGuard {
    deadline: Option<Instant>,
    op_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl IoGuard {
    /// Creates a guard that never expires.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the absolute deadline for the whole session.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets the timeout applied to each individual operation.
    #[must_use]
    pub const fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the session deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if the cancellation token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Earliest instant at which an operation starting now must give up.
    fn expiry(&self) -> Option<Instant> {
        let op = self.op_timeout.map(|t| Instant::now() + t);
        match (self.deadline, op) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Runs `fut` under this guard. `what` names the operation in errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] or [`Error::Cancelled`] if the guard fires
    /// first, otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, what: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled(what));
        }

        let bounded = async {
            match self.expiry() {
                Some(at) => tokio::time::timeout_at(at, fut)
                    .await
                    .map_err(|_| Error::Timeout(what))?,
                None => fut.await,
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(Error::Cancelled(what)),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_result() {
        let guard = IoGuard::new().with_op_timeout(Duration::from_secs(5));
        let value = guard.run("testing", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn op_timeout_fires() {
        let guard = IoGuard::new().with_op_timeout(Duration::from_secs(1));
        let err = guard
            .run("reading reply", std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout("reading reply")));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_over_longer_op_timeout() {
        let start = Instant::now();
        let guard = IoGuard::new()
            .with_deadline(Some(start + Duration::from_millis(100)))
            .with_op_timeout(Duration::from_secs(60));
        let err = guard
            .run("connecting", std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout("connecting")));
        assert!(Instant::now() - start < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_fires() {
        let token = CancellationToken::new();
        let guard = IoGuard::new().with_cancellation(Some(token.clone()));
        let canceller = tokio::spawn(async move { token.cancel() });
        let err = guard
            .run("writing command", std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, Error::Cancelled("writing command")));
    }

    #[tokio::test]
    async fn already_cancelled_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let guard = IoGuard::new().with_cancellation(Some(token));
        let err = guard
            .run("connecting", async { Ok::<(), Error>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled("connecting")));
    }
}
