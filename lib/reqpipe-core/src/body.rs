//! Body encoding and decoding.
//!
//! JSON goes through `serde_json`, with `serde_path_to_error` adding the path
//! of the failing field. Plain-text bodies are decoded through [`FromStr`].

use std::str::FromStr;

use bytes::Bytes;

use crate::Result;

/// Content type of a request or response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// Plain text content type (`text/plain`).
    PlainText,
    /// Binary content type (`application/octet-stream`).
    OctetStream,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
        }
    }

    /// Classify a `Content-Type` header value, ignoring parameters such as `charset`.
    ///
    /// ```
    /// use reqpipe_core::ContentType;
    ///
    /// assert_eq!(
    ///     ContentType::from_header("application/json; charset=utf-8"),
    ///     Some(ContentType::Json)
    /// );
    /// assert_eq!(ContentType::from_header("image/png"), None);
    /// ```
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let mime = value.split(';').next().unwrap_or_default().trim();
        if mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json") {
            Some(Self::Json)
        } else if mime.eq_ignore_ascii_case("text/plain") {
            Some(Self::PlainText)
        } else if mime.eq_ignore_ascii_case("application/octet-stream") {
            Some(Self::OctetStream)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// # Example
///
/// ```
/// use reqpipe_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Payload { id: u32 }
///
/// let bytes = to_json(&Payload { id: 7 }).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"id":7}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// # Errors
///
/// Returns [`crate::Error::JsonDeserialization`] with the path to the
/// problematic field (e.g., "user.address.city").
///
/// # Example
///
/// ```
/// use reqpipe_core::from_json;
/// use serde::Deserialize;
///
/// #[derive(Debug, PartialEq, Deserialize)]
/// struct Item { id: u32, name: String }
///
/// let item: Item = from_json(br#"{"id":1,"name":"mock"}"#).expect("deserialize");
/// assert_eq!(item, Item { id: 1, name: "mock".to_string() });
/// ```
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

/// Decode a plain-text body through [`FromStr`], trimming surrounding whitespace.
///
/// # Errors
///
/// Returns [`crate::Error::Decode`] if the body is not UTF-8 or does not parse.
///
/// # Example
///
/// ```
/// use reqpipe_core::from_text;
///
/// let answer: u32 = from_text(b"42\n").expect("parse");
/// assert_eq!(answer, 42);
/// ```
pub fn from_text<T>(bytes: &[u8]) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = std::str::from_utf8(bytes)
        .map_err(|e| crate::Error::Decode(format!("body is not valid UTF-8: {e}")))?;
    text.trim()
        .parse()
        .map_err(|e: T::Err| crate::Error::Decode(format!("cannot convert {text:?}: {e}")))
}
