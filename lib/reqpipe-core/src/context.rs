//! Cancellation and deadline context attached to every request.
//!
//! A [`RequestContext`] travels with the [`Request`](crate::Request) through
//! the pipeline. The transport races the exchange against it, and the retry
//! middleware checks it between attempts and while waiting.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use reqpipe_core::{CancellationToken, RequestContext};
//!
//! let token = CancellationToken::new();
//! let context = RequestContext::new()
//!     .with_cancellation(token.clone())
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert!(!context.is_done());
//! token.cancel();
//! assert!(context.error().is_some_and(|e| e.is_cancelled()));
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Cancellation token and optional deadline for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set an absolute deadline. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Set a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    ///
    /// Cancellation wins over an elapsed deadline.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Some(Error::Cancelled);
        }
        self.deadline
            .is_some_and(|deadline| deadline <= Instant::now())
            .then_some(Error::Timeout)
    }

    /// Returns `true` once cancelled or past the deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Wait until the context is done and return the reason.
    ///
    /// Never completes for a context without token and deadline.
    pub async fn done(&self) -> Error {
        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Error::Cancelled,
            () = expired => Error::Timeout,
        }
    }
}
