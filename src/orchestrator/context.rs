//! Deadline- and cancellation-scoped execution context for one run.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Context shared by every probe in one orchestration call.
///
/// The token is a child of the caller's token: canceling the caller cancels
/// the run, canceling the run never affects the caller. The deadline is
/// enforced by the aggregator, which cancels the token once it passes.
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Instant,
}

impl RunContext {
    /// Derives a run context from `parent` that expires after `timeout`.
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: expiry(timeout),
        }
    }

    /// Derives a context for a single probe attempt.
    ///
    /// The child expires at the earlier of the run deadline and `timeout`.
    /// Canceling the child leaves the run untouched.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = match timeout {
            Some(t) => self.deadline.min(expiry(t)),
            None => self.deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// Returns true once the run was canceled or its deadline handled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the context is canceled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel()
    }

    /// Instant at which the run gives up waiting.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, clamped for timeouts too large to represent.
fn expiry(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
