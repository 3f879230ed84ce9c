//! Error types for reqpipe.
//!
//! Every failure leaving the pipeline is an [`Error`]. The variants follow the
//! retry taxonomy: some transport errors can never succeed on a second attempt
//! ([`Error::is_unrecoverable`]), others are transient, and status codes are
//! split into retryable ([`Error::UnexpectedStatus`]) and terminal
//! ([`Error::Http`]) failures.

use derive_more::{Display, Error, From};

/// Main error type for reqpipe operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Terminal HTTP status (>= 400) surfaced to the caller with its body.
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message, usually the response body as text.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// Retryable status (429, or 5xx other than 501).
    #[display("unexpected HTTP status {status}")]
    #[from(skip)]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// The server certificate is not trusted.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// The request deadline or the client timeout elapsed.
    #[display("request timeout: deadline exceeded")]
    #[from(skip)]
    Timeout,

    /// The request context was cancelled.
    #[display("request cancelled")]
    #[from(skip)]
    Cancelled,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// The URL scheme cannot be served by the transport.
    #[display("unsupported protocol scheme \"{_0}\"")]
    #[from(skip)]
    UnsupportedScheme(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// A non-JSON body could not be converted to the requested type.
    #[display("decode error: {_0}")]
    #[from(skip)]
    Decode(#[error(not(source))] String),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// Too many redirects.
    #[display("stopped after {count} redirects (max {max})")]
    #[from(skip)]
    TooManyRedirects {
        /// Number of redirects followed.
        count: usize,
        /// Maximum allowed redirects.
        max: usize,
    },

    /// Invalid redirect response.
    #[display("invalid redirect: {_0}")]
    #[from(skip)]
    InvalidRedirect(#[error(not(source))] String),

    /// The authorize function could not provide a token.
    #[display("authorization failed: {_0}")]
    #[from(skip)]
    Authorization(#[error(not(source))] String),

    /// The retry budget is spent; `source` is the last failure.
    #[display("{method} {url} giving up after {attempts} attempt(s): {source}")]
    #[from(skip)]
    RetriesExhausted {
        /// Method of the failed request.
        #[error(not(source))]
        method: String,
        /// URL of the failed request.
        #[error(not(source))]
        url: String,
        /// Number of attempts made.
        #[error(not(source))]
        attempts: u32,
        /// Cause of the last failed attempt.
        source: Box<Error>,
    },
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: bytes::Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Create a retryable status error.
    #[must_use]
    pub const fn unexpected_status(status: u16) -> Self {
        Self::UnexpectedStatus { status }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if the request context was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the response body could not be decoded.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::JsonDeserialization { .. } | Self::Decode(_))
    }

    /// Returns `true` if sending the same request again cannot succeed.
    ///
    /// Covers malformed URLs, unsupported schemes, redirect-limit overflow,
    /// untrusted certificates and cancellation.
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_)
                | Self::InvalidRequest(_)
                | Self::UnsupportedScheme(_)
                | Self::TooManyRedirects { .. }
                | Self::InvalidRedirect(_)
                | Self::Tls(_)
                | Self::Cancelled
        )
    }

    /// Returns the HTTP status code carried by this error, if any.
    ///
    /// For [`Error::RetriesExhausted`] this is the status of the last attempt.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::UnexpectedStatus { status } => Some(*status),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the HTTP error body as JSON.
    ///
    /// Returns `None` if there is no body or this is not an HTTP error.
    ///
    /// # Example
    ///
    /// ```ignore
    /// #[derive(Debug, Deserialize)]
    /// struct ApiError {
    ///     error: String,
    /// }
    ///
    /// if let Err(err) = executor.fetch_json::<User>(request).await {
    ///     if let Some(Ok(api_error)) = err.decode_body::<ApiError>() {
    ///         eprintln!("API error: {}", api_error.error);
    ///     }
    /// }
    /// ```
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}
