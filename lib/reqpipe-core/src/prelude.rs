//! Prelude module for convenient imports.
//!
//! ```
//! use reqpipe_core::prelude::*;
//! ```

pub use crate::{
    CancellationToken, ContentType, Error, HttpClient, HttpClientExt, Method, Request,
    RequestBuilder, RequestContext, Response, Result, from_json, from_text, to_json,
};
