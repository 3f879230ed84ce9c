//! Prelude module for convenient imports.
//!
//! ```
//! use reqpipe::prelude::*;
//! ```

pub use crate::middleware::{CachePolicy, Credential, RetryPolicy, TokenRefresher};
pub use crate::{
    CancellationToken, Error, ExecutorConfig, HttpClient, HttpClientExt, Method, Middleware,
    Request, RequestContext, RequestExecutor, Response, Result, handler_fn,
};

pub use serde::{Deserialize, Serialize};
