//! Wait durations between retry attempts.
//!
//! A [`Backoff`] maps `(attempt, min, max, last_response)` to a wait. Any
//! `Fn` with that shape is a backoff, so custom strategies plug into
//! [`RetryPolicy::with_backoff`](super::RetryPolicy::with_backoff) directly.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;

use crate::Response;

/// Strategy computing the wait before the next attempt.
///
/// `attempt` is zero for the wait following the first attempt. `last` is the
/// response of the failed attempt, if the failure produced one.
pub trait Backoff: Send + Sync {
    /// Wait before the next attempt.
    fn wait(
        &self,
        attempt: u32,
        min: Duration,
        max: Duration,
        last: Option<&Response<Bytes>>,
    ) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32, Duration, Duration, Option<&Response<Bytes>>) -> Duration + Send + Sync,
{
    fn wait(
        &self,
        attempt: u32,
        min: Duration,
        max: Duration,
        last: Option<&Response<Bytes>>,
    ) -> Duration {
        self(attempt, min, max, last)
    }
}

/// `min * 2^attempt`, capped at `max`.
///
/// A 429 or 503 response with a `Retry-After` header in seconds overrides
/// the computed wait.
///
/// ```
/// use std::time::Duration;
/// use reqpipe::middleware::exponential_backoff;
///
/// let min = Duration::from_millis(500);
/// let max = Duration::from_secs(10);
/// assert_eq!(exponential_backoff(4, min, max, None), Duration::from_secs(8));
/// assert_eq!(exponential_backoff(5, min, max, None), max);
/// ```
#[must_use]
pub fn exponential_backoff(
    attempt: u32,
    min: Duration,
    max: Duration,
    last: Option<&Response<Bytes>>,
) -> Duration {
    if let Some(wait) = last
        .filter(|response| matches!(response.status(), 429 | 503))
        .and_then(Response::retry_after)
    {
        return wait;
    }

    2u32.checked_pow(attempt)
        .and_then(|factor| min.checked_mul(factor))
        .map_or(max, |wait| wait.min(max))
}

/// `(min + jitter) * attempt`, with jitter drawn uniformly from `[0, max - min)`.
///
/// Attempt zero counts as one. With `max <= min` there is no jitter and the
/// wait is exactly `min * attempt`.
#[must_use]
pub fn linear_jitter_backoff(
    attempt: u32,
    min: Duration,
    max: Duration,
    _last: Option<&Response<Bytes>>,
) -> Duration {
    let attempt = attempt.max(1);
    if max <= min {
        return min.saturating_mul(attempt);
    }

    let jitter = rand::thread_rng().gen_range(Duration::ZERO..max - min);
    (min + jitter).saturating_mul(attempt)
}
