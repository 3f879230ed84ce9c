//! HTTP client traits.
//!
//! - [`HttpClient`] - executes one request through whatever stands behind it
//! - [`HttpClientExt`] - typed helpers: status check plus body decoding
//!
//! A status of 400 or above becomes [`Error::Http`](crate::Error::Http) with
//! the response body as message. A body that fails to decode after a good
//! status is reported as a decode error, never as a status error.

use std::future::Future;

use bytes::Bytes;
use http::Method;

use crate::{Request, Response, Result};

/// Core HTTP client trait.
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts or cancellation
    /// - Exhausted retries
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

/// Extension trait for [`HttpClient`] with typed convenience methods.
pub trait HttpClientExt: HttpClient {
    /// Execute a request and decode the JSON body of a successful response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is 400 or above,
    /// or the body does not decode as `T`.
    fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<T>> + Send {
        async move { self.execute(request).await?.error_for_status()?.json() }
    }

    /// Execute a request and return the body of a successful response as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is 400 or above,
    /// or the body is not UTF-8.
    fn fetch_text(&self, request: Request<Bytes>) -> impl Future<Output = Result<String>> + Send {
        async move { self.execute(request).await?.error_for_status()?.text() }
    }

    /// GET a URL and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or [`Self::fetch_json`] fails.
    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<T>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::GET, url)
                .header("Accept", crate::ContentType::Json.as_str())
                .build();
            self.fetch_json(request).await
        }
    }

    /// POST a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the request fails.
    fn post_json<B, T>(&self, url: &str, body: &B) -> impl Future<Output = Result<T>> + Send
    where
        B: serde::Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::POST, url).json(body)?.build();
            self.fetch_json(request).await
        }
    }

    /// PUT a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the request fails.
    fn put_json<B, T>(&self, url: &str, body: &B) -> impl Future<Output = Result<T>> + Send
    where
        B: serde::Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::PUT, url).json(body)?.build();
            self.fetch_json(request).await
        }
    }

    /// Execute a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is 400 or above.
    fn delete(&self, url: &str) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::DELETE, url).build();
            self.execute(request).await?.error_for_status()
        }
    }
}

impl<T: HttpClient> HttpClientExt for T {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use assert2::{check, let_assert};

    use super::*;

    /// Replies with a fixed status and body, recording the last request.
    struct Canned {
        status: u16,
        body: &'static str,
        seen: Mutex<Option<Request<Bytes>>>,
    }

    impl Canned {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                seen: Mutex::new(None),
            }
        }
    }

    impl HttpClient for Canned {
        async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
            *self.seen.lock().expect("lock") = Some(request);
            Ok(Response::new(
                self.status,
                HashMap::new(),
                Bytes::from_static(self.body.as_bytes()),
            ))
        }
    }

    #[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
    struct Item {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn get_json_decodes_success() {
        let client = Canned::new(200, r#"{"id":1,"name":"mock"}"#);

        let item: Item = client
            .get_json("https://example.com/items/1")
            .await
            .expect("item");

        check!(item == Item { id: 1, name: "mock".to_string() });
        let seen = client.seen.lock().expect("lock").take().expect("request");
        check!(seen.method() == &Method::GET);
        check!(seen.header("accept") == Some("application/json"));
    }

    #[tokio::test]
    async fn status_error_carries_body() {
        let client = Canned::new(400, r#"{"error":"custom endpoint error"}"#);

        let_assert!(Err(err) = client.get_json::<Item>("https://example.com/items/1").await);
        check!(err.status() == Some(400));
        check!(err.to_string().contains("custom endpoint error"));
    }

    #[tokio::test]
    async fn decode_failure_is_not_a_status_error() {
        let client = Canned::new(200, r#"{"id":"one"}"#);

        let_assert!(Err(err) = client.get_json::<Item>("https://example.com/items/1").await);
        check!(err.is_decode());
        check!(err.status() == None);
    }

    #[tokio::test]
    async fn post_json_sends_body() {
        let client = Canned::new(201, r#"{"id":2,"name":"created"}"#);
        let payload = Item {
            id: 2,
            name: "created".to_string(),
        };

        let created: Item = client
            .post_json("https://example.com/items", &payload)
            .await
            .expect("created");

        check!(created == payload);
        let seen = client.seen.lock().expect("lock").take().expect("request");
        check!(seen.method() == &Method::POST);
        check!(seen.header("content-type") == Some("application/json"));
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let client = Canned::new(200, "");
        let_assert!(Err(crate::Error::InvalidUrl(_)) = client.delete("not a url").await);
    }

    #[tokio::test]
    async fn fetch_text_returns_body() {
        let client = Canned::new(200, "pong");
        let request =
            Request::builder(Method::GET, url::Url::parse("https://example.com/ping").expect("url"))
                .build();

        let text = client.fetch_text(request).await.expect("text");
        check!(text == "pong");
    }
}
