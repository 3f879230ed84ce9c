//! Core types and traits for the reqpipe HTTP request pipeline.
//!
//! This crate holds everything that does not depend on a transport:
//! - [`Request`], [`RequestBuilder`] and [`RequestContext`] - what goes in
//! - [`Response`] - what comes out, with a fully buffered body
//! - [`Error`] and [`Result`] - the error taxonomy shared by every stage
//! - [`HttpClient`] and [`HttpClientExt`] - execution and typed decoding
//! - [`Method`], [`StatusCode`] and [`header`] - re-exported from `http`
//! - [`CancellationToken`] - re-exported from `tokio-util`

mod body;
mod client;
mod context;
mod error;
pub mod prelude;
mod request;
mod response;

pub use body::{ContentType, from_json, from_text, to_json};
pub use client::{HttpClient, HttpClientExt};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use request::{Request, RequestBuilder};
pub use response::Response;

pub use http::{Method, StatusCode, header};
pub use tokio_util::sync::CancellationToken;
