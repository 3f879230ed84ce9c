//! Slow-request monitor.
//!
//! Records `http_client_request_duration_seconds` (histogram) for every call
//! and, when a call takes longer than the threshold, logs a warning and bumps
//! `http_client_slow_requests_total`. Both are labelled by method.

use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::warn;

use crate::{Error, Request, Response, Result, pipeline::ServiceFuture};

const LABEL_METHOD: &str = "method";

const METRIC_REQUEST_DURATION: &str = "http_client_request_duration_seconds";
const METRIC_SLOW_REQUESTS: &str = "http_client_slow_requests_total";

/// Layer that reports requests slower than a threshold.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceLayer {
    threshold: Duration,
}

impl PerformanceLayer {
    /// Warn about calls lasting longer than `threshold`.
    #[must_use]
    pub const fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// The slow-request threshold.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl<S> Layer<S> for PerformanceLayer {
    type Service = Performance<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Performance {
            inner,
            threshold: self.threshold,
        }
    }
}

/// Service that times requests.
#[derive(Debug, Clone)]
pub struct Performance<S> {
    inner: S,
    threshold: Duration,
}

impl<S> Service<Request<Bytes>> for Performance<S>
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
        let method = request.method().to_string();
        let url = request.url().to_string();
        let threshold = self.threshold;

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            let start = Instant::now();
            let result = inner.call(request).await;
            let elapsed = start.elapsed();

            metrics::histogram!(METRIC_REQUEST_DURATION, LABEL_METHOD => method.clone())
                .record(elapsed.as_secs_f64());

            if elapsed > threshold {
                warn!(
                    %method,
                    %url,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    threshold_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX),
                    "slow request"
                );
                metrics::counter!(METRIC_SLOW_REQUESTS, LABEL_METHOD => method).increment(1);
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tower::ServiceExt;

    use super::*;
    use crate::{Method, handler_fn};

    #[tokio::test]
    async fn passes_result_through() {
        let service = PerformanceLayer::new(Duration::from_millis(1)).layer(handler_fn(
            |_request| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Response::new(200, HashMap::new(), Bytes::new()))
            },
        ));

        let request = Request::builder(
            Method::GET,
            url::Url::parse("https://example.com/slow").expect("url"),
        )
        .build();

        let response = service.oneshot(request).await.expect("response");
        assert_eq!(response.status(), 200);
    }

    #[test]
    fn keeps_threshold() {
        let layer = PerformanceLayer::new(Duration::from_secs(2));
        assert_eq!(layer.threshold(), Duration::from_secs(2));
    }
}
