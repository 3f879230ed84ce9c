//! Tower middleware layers for the request pipeline.
//!
//! Every layer here works on [`Request<Bytes>`](crate::Request) and
//! [`Response<Bytes>`](crate::Response) and can be attached to a
//! [`RequestExecutor`](crate::RequestExecutor) either through its helper
//! methods or with [`RequestExecutor::layer`](crate::RequestExecutor::layer).
//!
//! | Layer | Helper |
//! |-------|--------|
//! | [`LoggingLayer`] | `.with_logging()`, `.with_debug_logging()` |
//! | [`PerformanceLayer`] | `.with_performance_monitor(threshold)` |
//! | [`CacheLayer`] | `.with_caching(ttl)`, `.with_caching_policy(ttl, policy)` |
//! | [`RetryLayer`] | `.with_exponential_retry(n)`, `.with_linear_retry(n)`, `.with_retry_policy(policy)` |
//! | [`AuthorizationLayer`] | `.with_authorization(schema, authorize)`, `.with_token_refresher(refresher)` |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use reqpipe::RequestExecutor;
//!
//! let executor = RequestExecutor::new()
//!     .with_logging()
//!     .with_exponential_retry(3)
//!     .with_caching(Duration::from_secs(30));
//! # let _ = executor;
//! ```

mod authorization;
mod backoff;
mod cache;
mod logging;
mod performance;
mod retry;
mod token;

pub use authorization::{Authorization, AuthorizationLayer};
pub use backoff::{Backoff, exponential_backoff, linear_jitter_backoff};
pub use cache::{Cache, CacheLayer, CachePolicy, CacheStore, cache_key};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use performance::{Performance, PerformanceLayer};
pub use retry::{DEFAULT_MAX_WAIT, DEFAULT_MIN_WAIT, Retry, RetryLayer, RetryPolicy};
pub use token::{
    Credential, LIFESPAN_SAFETY_MARGIN, MIN_REFRESH_INTERVAL, TokenRefresher, TokenResult,
};

pub use tower::{Layer, ServiceBuilder};
