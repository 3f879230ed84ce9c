//! HTTP response handling.
//!
//! [`Response`] holds the fully buffered body, so a response can be cloned,
//! cached, and decoded more than once.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use bytes::Bytes;
//! use reqpipe_core::Response;
//!
//! let response = Response::new(200, HashMap::new(), Bytes::from("42"));
//! let answer: u32 = response.parse().expect("number");
//! assert_eq!(answer, 42);
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;

use crate::ContentType;
use crate::request::find_header;

/// HTTP response with status, headers, and body.
#[derive(Debug, Clone)]
pub struct Response<B = Bytes> {
    status: u16,
    headers: HashMap<String, String>,
    body: B,
}

impl<B> Response<B> {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: HashMap<String, String>, body: B) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Single header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The `Content-Type` header, classified.
    #[must_use]
    pub fn content_type(&self) -> Option<ContentType> {
        self.header("content-type").and_then(ContentType::from_header)
    }

    /// The `Retry-After` header, when it holds a number of seconds.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (u16, HashMap<String, String>, B) {
        (self.status, self.headers, self.body)
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 3xx.
    #[must_use]
    pub const fn is_redirection(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Transform the body with a function.
    pub fn map_body<F, B2>(self, f: F) -> Response<B2>
    where
        F: FnOnce(B) -> B2,
    {
        Response {
            status: self.status,
            headers: self.headers,
            body: f(self.body),
        }
    }
}

impl Response<Bytes> {
    /// Turn a status of 400 or above into [`crate::Error::Http`].
    ///
    /// The error message is the response body as text, and the raw body is
    /// kept for [`crate::Error::decode_body`].
    ///
    /// # Errors
    ///
    /// Returns an error when the status is 400 or above.
    pub fn error_for_status(self) -> crate::Result<Self> {
        if self.status < 400 {
            return Ok(self);
        }
        let message = String::from_utf8_lossy(&self.body).trim().to_string();
        Err(crate::Error::http_with_body(self.status, message, self.body))
    }

    /// Deserialize the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn json<T: serde::de::DeserializeOwned>(self) -> crate::Result<T> {
        crate::from_json(&self.body)
    }

    /// Get the response body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid UTF-8.
    pub fn text(self) -> crate::Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| crate::Error::Decode(format!("body is not valid UTF-8: {e}")))
    }

    /// Convert a plain-text body through [`FromStr`].
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not parse as `T`.
    pub fn parse<T>(self) -> crate::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        crate::from_text(&self.body)
    }
}
