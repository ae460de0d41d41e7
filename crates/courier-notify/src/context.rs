//! Per-call deadline and cancellation.

use std::time::Duration;

use courier_smtp::IoGuard;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation for one send.
///
/// Both apply to every network operation of the session, on top of the
/// per-operation timeouts from [`SessionConfig`](crate::SessionConfig).
#[derive(Debug, Clone, Default)]
pub struct SendContext {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl SendContext {
    /// A context without deadline or cancellation.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().with_deadline(Instant::now() + timeout)
    }

    /// Sets the absolute deadline, keeping the earlier one if already set.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn guard(&self, op_timeout: Duration) -> IoGuard {
        IoGuard::new()
            .with_deadline(self.deadline)
            .with_op_timeout(op_timeout)
            .with_cancellation(self.cancel.clone())
    }
}
