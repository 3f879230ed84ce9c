//! The composition root.
//!
//! A [`RequestExecutor`] owns the pooled transport, the ordered middleware
//! list, and the handler composed from both. Configuration methods consume
//! the executor and return it with the handler rebuilt, so an executor is
//! fully configured before anything can share it.

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::task::{Context, Poll};
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use tower::Layer;
use tower_service::Service;
use tracing::debug;

use crate::middleware::{
    AuthorizationLayer, CacheLayer, CachePolicy, Credential, LoggingLayer, PerformanceLayer,
    RetryLayer, RetryPolicy, TokenRefresher,
};
use crate::pipeline::{Handler, Middleware, Pipeline, ServiceFuture, SharedHandler};
use crate::transport::HyperTransport;
use crate::{Error, ExecutorConfig, Request, Response, Result};

/// HTTP executor running every request through its middleware pipeline.
///
/// The first middleware attached is the outermost one.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use reqpipe::{HttpClientExt, RequestExecutor};
///
/// #[derive(serde::Deserialize)]
/// struct Item {
///     id: u32,
/// }
///
/// # async fn run() -> reqpipe::Result<()> {
/// let executor = RequestExecutor::new()
///     .with_timeout(Duration::from_secs(5))
///     .with_logging()
///     .with_exponential_retry(3);
///
/// let item: Item = executor.get_json("https://api.example.com/items/1").await?;
/// # let _ = item.id;
/// # Ok(())
/// # }
/// ```
pub struct RequestExecutor {
    transport: HyperTransport,
    config: ExecutorConfig,
    pipeline: Pipeline,
    handler: SharedHandler,
    caching: bool,
    retrying: bool,
    authorizing: bool,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("config", &self.config)
            .field("middlewares", &self.pipeline.len())
            .field("caching", &self.caching)
            .field("retrying", &self.retrying)
            .field("authorizing", &self.authorizing)
            .finish_non_exhaustive()
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestExecutor {
    /// Executor with default configuration and no middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    /// Executor with custom configuration and no middleware.
    #[must_use]
    pub fn with_config(config: ExecutorConfig) -> Self {
        let transport = HyperTransport::new(&config);
        let terminal = transport.clone().into_handler(config.max_redirects);
        Self {
            transport,
            config,
            pipeline: Pipeline::new(),
            handler: SharedHandler::new(terminal),
            caching: false,
            retrying: false,
            authorizing: false,
        }
    }

    /// The executor configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Number of attached middlewares.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.pipeline.len()
    }

    fn rebuild(mut self) -> Self {
        let terminal = self
            .transport
            .clone()
            .into_handler(self.config.max_redirects);
        self.handler = SharedHandler::new(self.pipeline.compose(terminal));
        self
    }

    /// Set the deadline for one exchange, headers and body included.
    ///
    /// The connection pool is kept.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self.transport = self.transport.with_timeout(timeout);
        self.rebuild()
    }

    /// Attach a middleware after those already attached.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.pipeline.attach(middleware);
        self.rebuild()
    }

    /// Attach several middlewares, in order.
    #[must_use]
    pub fn with_middlewares(mut self, middlewares: impl IntoIterator<Item = Middleware>) -> Self {
        for middleware in middlewares {
            self.pipeline.attach(middleware);
        }
        self.rebuild()
    }

    /// Attach a tower layer as a middleware.
    #[must_use]
    pub fn layer<L>(self, layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request<Bytes>>>::Future: Send + 'static,
    {
        self.with_middleware(Middleware::from_layer(layer))
    }

    /// Log each request and its outcome at info level.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.layer(LoggingLayer::new())
    }

    /// Log each request with its headers at debug level.
    #[must_use]
    pub fn with_debug_logging(self) -> Self {
        self.layer(LoggingLayer::debug())
    }

    /// Warn about requests slower than `threshold` and record their duration.
    #[must_use]
    pub fn with_performance_monitor(self, threshold: Duration) -> Self {
        self.layer(PerformanceLayer::new(threshold))
    }

    /// Cache successful GET responses for `ttl`.
    ///
    /// Only the first caching call has an effect.
    #[must_use]
    pub fn with_caching(self, ttl: Duration) -> Self {
        self.with_caching_policy(ttl, CachePolicy::default())
    }

    /// Cache GET responses selected by `policy` for `ttl`.
    ///
    /// Only the first caching call has an effect.
    #[must_use]
    pub fn with_caching_policy(mut self, ttl: Duration, policy: CachePolicy) -> Self {
        if self.caching {
            debug!("caching already enabled, ignoring");
            return self;
        }
        self.caching = true;
        self.layer(CacheLayer::new(ttl, policy))
    }

    /// Retry up to `retry_count` times with exponential backoff.
    ///
    /// Waits are bounded by the configured `min_retry_wait` and
    /// `max_retry_wait`. Only the first retry call has an effect.
    #[must_use]
    pub fn with_exponential_retry(self, retry_count: u32) -> Self {
        let policy = self.bounded(RetryPolicy::exponential(retry_count));
        self.with_retry_policy(policy)
    }

    /// Retry up to `retry_count` times with linear backoff and jitter.
    ///
    /// Waits are bounded by the configured `min_retry_wait` and
    /// `max_retry_wait`. Only the first retry call has an effect.
    #[must_use]
    pub fn with_linear_retry(self, retry_count: u32) -> Self {
        let policy = self.bounded(RetryPolicy::linear(retry_count));
        self.with_retry_policy(policy)
    }

    fn bounded(&self, policy: RetryPolicy) -> RetryPolicy {
        policy
            .with_min_wait(self.config.min_retry_wait)
            .with_max_wait(self.config.max_retry_wait)
    }

    /// Retry according to `policy`.
    ///
    /// Only the first retry call has an effect.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        if self.retrying {
            debug!("retry already enabled, ignoring");
            return self;
        }
        self.retrying = true;
        self.layer(RetryLayer::new(policy))
    }

    /// Authorize requests with tokens from `authorize`, refreshed in the background.
    ///
    /// Only the first authorization call has an effect.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn with_authorization<F, Fut>(self, schema: impl Into<String>, authorize: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Credential>> + Send + 'static,
    {
        if self.authorizing {
            debug!("authorization already enabled, ignoring");
            return self;
        }
        self.with_token_refresher(TokenRefresher::new(schema, authorize))
    }

    /// Authorize requests with tokens from an existing refresher.
    ///
    /// Only the first authorization call has an effect.
    #[must_use]
    pub fn with_token_refresher(mut self, refresher: TokenRefresher) -> Self {
        if self.authorizing {
            debug!("authorization already enabled, ignoring");
            return self;
        }
        self.authorizing = true;
        self.layer(AuthorizationLayer::new(refresher))
    }

    /// A clone of the composed handler.
    #[must_use]
    pub fn handler(&self) -> Handler {
        self.handler.get()
    }

    /// Run `request` through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not handled by a middleware.
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.handler.call(request).await
    }
}

impl reqpipe_core::HttpClient for RequestExecutor {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.handler.call(request).await
    }
}

impl Service<Request<Bytes>> for RequestExecutor {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        self.handler.call(request)
    }
}

static DEFAULT_EXECUTOR: LazyLock<ArcSwap<RequestExecutor>> =
    LazyLock::new(|| ArcSwap::from_pointee(RequestExecutor::new()));

/// The process-wide default executor.
///
/// Created with [`RequestExecutor::new`] on first use. Requests already
/// holding the returned `Arc` keep using it after a swap.
#[must_use]
pub fn default_executor() -> Arc<RequestExecutor> {
    DEFAULT_EXECUTOR.load_full()
}

/// Replace the process-wide default executor.
pub fn set_default_executor(executor: RequestExecutor) {
    DEFAULT_EXECUTOR.store(Arc::new(executor));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_defaults() {
        let executor = RequestExecutor::new();
        assert_eq!(executor.config().timeout, Duration::from_secs(30));
        assert_eq!(executor.middleware_count(), 0);
    }

    #[test]
    fn with_timeout_updates_config() {
        let executor = RequestExecutor::new().with_timeout(Duration::from_millis(100));
        assert_eq!(executor.config().timeout, Duration::from_millis(100));
    }

    #[test]
    fn enable_once_features_are_guarded() {
        let executor = RequestExecutor::new()
            .with_caching(Duration::from_secs(1))
            .with_caching_policy(Duration::from_secs(1), CachePolicy::Failures)
            .with_exponential_retry(1)
            .with_linear_retry(5)
            .with_retry_policy(RetryPolicy::exponential(2));

        assert_eq!(executor.middleware_count(), 2);
    }

    #[test]
    fn logging_and_monitor_can_stack() {
        let executor = RequestExecutor::new()
            .with_logging()
            .with_debug_logging()
            .with_performance_monitor(Duration::from_millis(200))
            .with_middlewares([Middleware::from_fn(|next| next)]);

        assert_eq!(executor.middleware_count(), 4);
    }

    #[test]
    fn executor_is_debug() {
        let debug = format!("{:?}", RequestExecutor::new().with_logging());
        assert!(debug.contains("RequestExecutor"));
        assert!(debug.contains("middlewares: 1"));
    }
}
