//! Composable HTTP request pipeline.
//!
//! A [`RequestExecutor`] wraps a pooled hyper client in an ordered chain of
//! middleware: logging, slow-request monitoring, GET caching, retry with
//! backoff, and authorization with a background-refreshed token. The first
//! middleware attached is the outermost one.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use reqpipe::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! # async fn run() -> reqpipe::Result<()> {
//! let executor = RequestExecutor::new()
//!     .with_logging()
//!     .with_exponential_retry(3)
//!     .with_caching(Duration::from_secs(60))
//!     .with_authorization("Bearer", || async {
//!         Ok(Credential::new("token", Duration::from_secs(3600)))
//!     });
//!
//! let user: User = executor.get_json("https://api.example.com/users/42").await?;
//! println!("{} is {}", user.id, user.name);
//! # Ok(())
//! # }
//! ```

mod config;
mod connector;
mod executor;
pub mod middleware;
mod pipeline;
pub mod prelude;
pub mod transport;

pub use config::{ExecutorConfig, ExecutorConfigBuilder};
pub use executor::{RequestExecutor, default_executor, set_default_executor};
pub use pipeline::{Handler, Middleware, Pipeline, ServiceFuture, handler_fn};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use reqpipe_core::{
    CancellationToken, ContentType, Error, HttpClient, HttpClientExt, Method, Request,
    RequestBuilder, RequestContext, Response, Result, StatusCode, from_json, from_text, header,
    to_json,
};

pub use url;
