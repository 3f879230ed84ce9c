//! Retry middleware for HTTP requests.
//!
//! Each attempt ends in one of three ways:
//! - **done**: a non-retryable status, a success, an unrecoverable transport
//!   error (see [`Error::is_unrecoverable`]), or a finished request context
//! - **retry**: any other transport error, `429`, or a `5xx` other than `501`
//! - **give up**: a retry was wanted but the budget is spent, reported as
//!   [`Error::RetriesExhausted`] wrapping the last cause
//!
//! With a retry count of `N` at most `N + 1` attempts are made. Between
//! attempts the task sleeps for the backoff wait; cancelling the request
//! context aborts the sleep at once.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use super::backoff::{Backoff, exponential_backoff, linear_jitter_backoff};
use crate::{Error, Request, RequestContext, Response, Result, pipeline::ServiceFuture};

/// Default lower bound for backoff waits.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_millis(500);
/// Default upper bound for backoff waits.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Retry budget and backoff strategy.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use reqpipe::middleware::RetryPolicy;
///
/// let policy = RetryPolicy::exponential(3)
///     .with_min_wait(Duration::from_millis(100))
///     .with_max_wait(Duration::from_secs(2));
///
/// assert_eq!(policy.retry_count(), 3);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    min_wait: Duration,
    max_wait: Duration,
    retry_count: u32,
    backoff: Arc<dyn Backoff>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("min_wait", &self.min_wait)
            .field("max_wait", &self.max_wait)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Retry up to `retry_count` times with [`exponential_backoff`].
    #[must_use]
    pub fn exponential(retry_count: u32) -> Self {
        Self::with_strategy(retry_count, exponential_backoff)
    }

    /// Retry up to `retry_count` times with [`linear_jitter_backoff`].
    #[must_use]
    pub fn linear(retry_count: u32) -> Self {
        Self::with_strategy(retry_count, linear_jitter_backoff)
    }

    fn with_strategy(retry_count: u32, backoff: impl Backoff + 'static) -> Self {
        Self {
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            retry_count,
            backoff: Arc::new(backoff),
        }
    }

    /// Set the lower bound passed to the backoff.
    #[must_use]
    pub const fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self
    }

    /// Set the upper bound passed to the backoff.
    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Replace the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Maximum number of retries after the first attempt.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Lower bound passed to the backoff.
    #[must_use]
    pub const fn min_wait(&self) -> Duration {
        self.min_wait
    }

    /// Upper bound passed to the backoff.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }

    fn wait(&self, attempt: u32, last: Option<&Response<Bytes>>) -> Duration {
        self.backoff.wait(attempt, self.min_wait, self.max_wait, last)
    }
}

/// 429, and every 5xx except 501.
const fn is_retryable_status(status: u16) -> bool {
    status == 429 || (status >= 500 && status < 600 && status != 501)
}

/// Outcome of one attempt.
enum Decision {
    Done(Result<Response<Bytes>>),
    Retry {
        cause: Error,
        last: Option<Response<Bytes>>,
    },
}

fn decide(context: &RequestContext, result: Result<Response<Bytes>>) -> Decision {
    if let Some(err) = context.error() {
        return Decision::Done(Err(err));
    }

    match result {
        Err(err) if err.is_unrecoverable() => Decision::Done(Err(err)),
        Err(cause) => Decision::Retry { cause, last: None },
        Ok(response) if is_retryable_status(response.status()) => Decision::Retry {
            cause: Error::unexpected_status(response.status()),
            last: Some(response),
        },
        Ok(response) => Decision::Done(Ok(response)),
    }
}

/// Layer that retries failed requests.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    /// Create a retry layer from a policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Service that retries failed requests.
#[derive(Debug, Clone)]
pub struct Retry<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<Request<Bytes>> for Retry<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.clone();

        Box::pin(async move {
            let mut attempt: u32 = 0;

            loop {
                let result = inner.call(request.clone()).await;

                let (cause, last) = match decide(request.context(), result) {
                    Decision::Done(result) => return result,
                    Decision::Retry { cause, last } => (cause, last),
                };

                if attempt >= policy.retry_count {
                    return Err(Error::RetriesExhausted {
                        method: request.method().to_string(),
                        url: request.url().to_string(),
                        attempts: attempt + 1,
                        source: Box::new(cause),
                    });
                }

                let wait = policy.wait(attempt, last.as_ref());
                debug!(
                    attempt = attempt + 1,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    error = %cause,
                    "retrying request"
                );

                tokio::select! {
                    biased;
                    err = request.context().done() => return Err(err),
                    () = tokio::time::sleep(wait) => {}
                }

                attempt += 1;
                inner = ServiceExt::<Request<Bytes>>::ready_oneshot(inner).await?;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert2::{check, let_assert};

    use super::*;
    use crate::pipeline::{Handler, handler_fn};
    use crate::{CancellationToken, Method};

    /// Handler answering with `outcome(attempt)`, counting calls.
    fn scripted<F>(calls: Arc<AtomicU32>, outcome: F) -> Handler
    where
        F: Fn(u32) -> Result<Response<Bytes>> + Clone + Send + Sync + 'static,
    {
        handler_fn(move |_request| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            let result = outcome(attempt);
            async move { result }
        })
    }

    fn status(code: u16) -> Result<Response<Bytes>> {
        Ok(Response::new(code, HashMap::new(), Bytes::new()))
    }

    fn request() -> Request<Bytes> {
        Request::builder(
            Method::GET,
            url::Url::parse("https://example.com/resource").expect("url"),
        )
        .build()
    }

    fn policy(retry_count: u32) -> RetryPolicy {
        RetryPolicy::exponential(retry_count)
            .with_min_wait(Duration::from_millis(10))
            .with_max_wait(Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn makes_retry_count_plus_one_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let service = RetryLayer::new(policy(3)).layer(scripted(Arc::clone(&calls), |_| status(503)));

        let_assert!(Err(err) = service.oneshot(request()).await);
        check!(calls.load(Ordering::SeqCst) == 4);
        let_assert!(Error::RetriesExhausted { attempts, .. } = &err);
        check!(*attempts == 4);
        check!(err.status() == Some(503));
        check!(err.to_string().contains("giving up after 4 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let service = RetryLayer::new(policy(5)).layer(scripted(Arc::clone(&calls), |attempt| {
            match attempt {
                0 => Err(Error::connection("connection reset")),
                1 => status(502),
                _ => status(200),
            }
        }));

        let response = service.oneshot(request()).await.expect("response");
        check!(response.status() == 200);
        check!(calls.load(Ordering::SeqCst) == 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_statuses_are_not_retried() {
        for code in [200, 404, 400, 501] {
            let calls = Arc::new(AtomicU32::new(0));
            let service =
                RetryLayer::new(policy(3)).layer(scripted(Arc::clone(&calls), move |_| status(code)));

            let response = service.oneshot(request()).await.expect("response");
            check!(response.status() == code);
            check!(calls.load(Ordering::SeqCst) == 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_errors_get_one_attempt() {
        let failures: [fn() -> Error; 3] = [
            || Error::TooManyRedirects { count: 10, max: 10 },
            || Error::UnsupportedScheme("ftp".to_string()),
            || Error::tls("invalid peer certificate: UnknownIssuer"),
        ];

        for failure in failures {
            let calls = Arc::new(AtomicU32::new(0));
            let service =
                RetryLayer::new(policy(3)).layer(scripted(Arc::clone(&calls), move |_| Err(failure())));

            let_assert!(Err(err) = service.oneshot(request()).await);
            check!(err.is_unrecoverable());
            check!(calls.load(Ordering::SeqCst) == 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_context_stops_after_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let service = RetryLayer::new(policy(3)).layer(scripted(Arc::clone(&calls), |_| status(503)));

        let token = CancellationToken::new();
        token.cancel();
        let request = Request::builder(
            Method::GET,
            url::Url::parse("https://example.com/resource").expect("url"),
        )
        .cancellation(token)
        .build();

        let_assert!(Err(err) = service.oneshot(request).await);
        check!(err.is_cancelled());
        check!(calls.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_stops_after_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let slow = {
            let calls = Arc::clone(&calls);
            handler_fn(move |_request| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    status(503)
                }
            })
        };
        let service = RetryLayer::new(policy(3)).layer(slow);

        let request = Request::builder(
            Method::GET,
            url::Url::parse("https://example.com/resource").expect("url"),
        )
        .timeout(Duration::from_millis(500))
        .build();

        let_assert!(Err(err) = service.oneshot(request).await);
        check!(err.is_timeout());
        check!(calls.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let calls = Arc::new(AtomicU32::new(0));
        let service = RetryLayer::new(
            RetryPolicy::exponential(3)
                .with_min_wait(Duration::from_secs(60))
                .with_max_wait(Duration::from_secs(60)),
        )
        .layer(scripted(Arc::clone(&calls), |_| status(503)));

        let token = CancellationToken::new();
        let request = Request::builder(
            Method::GET,
            url::Url::parse("https://example.com/resource").expect("url"),
        )
        .cancellation(token.clone())
        .build();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let started = tokio::time::Instant::now();
        let_assert!(Err(err) = service.oneshot(request).await);
        check!(err.is_cancelled());
        check!(calls.load(Ordering::SeqCst) == 1);
        check!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_drives_the_wait() {
        let calls = Arc::new(AtomicU32::new(0));
        let service = RetryLayer::new(policy(1)).layer(scripted(Arc::clone(&calls), |attempt| {
            if attempt == 0 {
                let headers = HashMap::from([("retry-after".to_string(), "5".to_string())]);
                Ok(Response::new(429, headers, Bytes::new()))
            } else {
                status(200)
            }
        }));

        let started = tokio::time::Instant::now();
        let response = service.oneshot(request()).await.expect("response");
        check!(response.status() == 200);
        check!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn policy_defaults() {
        let policy = RetryPolicy::linear(2);
        check!(policy.retry_count() == 2);
        check!(policy.min_wait() == DEFAULT_MIN_WAIT);
        check!(policy.max_wait() == DEFAULT_MAX_WAIT);
    }
}
