//! Execution context: cooperative cancellation plus an optional deadline.
//!
//! Every [`Book`](crate::book::Book) call takes a `&Context`. The book checks
//! it before each content-store call and once more before swapping the root
//! pointer; an error from [`Context::check`] aborts the operation before
//! anything becomes visible.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a context stopped an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context's token was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// The context's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation token and deadline carried through a book operation.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context that is cancelled whenever `self` is, and may also be
    /// cancelled on its own. The deadline is inherited.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token, for callers that want to await cancellation.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if one was set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Return an error if the context has been cancelled or has expired.
    ///
    /// # Errors
    /// [`ContextError::Cancelled`] after [`Context::cancel`];
    /// [`ContextError::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ContextError::DeadlineExceeded);
        }
        Ok(())
    }
}
