// crates/perf-ledger-core/src/runtime/context.rs
// ============================================================================
// Module: Perf Ledger Call Context
// Description: Caller-supplied cancellation and deadline for one call.
// Purpose: Bound every store call and retry sleep by the caller's budget.
// Dependencies: tokio, tokio-util
// ============================================================================

//! ## Overview
//! A [`CallContext`] is threaded through every store call and every jitter
//! sleep. When it is cancelled or its deadline passes, the in-flight future
//! is dropped. Each store write is a single atomic conditional write, so an
//! interrupted attempt is either acknowledged in full or not applied at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Call Context
// ============================================================================

/// Cancellation token plus optional deadline for one protocol call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Cooperative cancellation signal.
    cancel: CancellationToken,
    /// Absolute deadline, if any.
    deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context with no deadline that is never cancelled implicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context bound to an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the cancellation token for sharing with other tasks.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true when cancelled or past the deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Runs `future` unless the context finishes first.
    ///
    /// Returns `None` when the context was cancelled or timed out.
    pub(crate) async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        if self.is_done() {
            return None;
        }
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            () = expired => None,
            output = future => Some(output),
        }
    }

    /// Sleeps for `delay` unless the context finishes first.
    ///
    /// Returns `false` when the sleep was interrupted.
    pub(crate) async fn sleep(&self, delay: Duration) -> bool {
        self.run(tokio::time::sleep(delay)).await.is_some()
    }
}
