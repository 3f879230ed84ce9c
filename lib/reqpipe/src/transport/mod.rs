//! Terminal handler: one exchange through the pooled hyper client.
//!
//! [`HyperTransport`] sends the request, reads the whole body, and races
//! both against the executor timeout and the request context. Redirects are
//! followed by [`FollowRedirect`] sitting directly on top of it.

mod redirect;

use std::collections::HashMap;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower::util::BoxCloneService;
use tower_service::Service;

pub use redirect::{FollowRedirect, FollowRedirectLayer};

use crate::{
    Error, ExecutorConfig, Request, Response, Result, connector::https_connector,
    pipeline::{Handler, ServiceFuture},
};

/// Pooled HTTP/HTTPS client performing a single exchange per call.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Build the transport and its connection pool.
    #[must_use]
    pub fn new(config: &ExecutorConfig) -> Self {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(https_connector(config));

        Self {
            inner,
            timeout: config.timeout,
        }
    }

    /// Same pool, different exchange timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Terminal handler: this transport behind redirect following.
    #[must_use]
    pub fn into_handler(self, max_redirects: usize) -> Handler {
        BoxCloneService::new(FollowRedirect::with_max_redirects(self, max_redirects))
    }

    fn build_hyper_request(
        method: http::Method,
        url: &url::Url,
        headers: &HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Result<http::Request<Full<Bytes>>> {
        let mut builder = http::Request::builder().method(method).uri(url.as_str());

        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(body.map_or_else(Full::default, Full::new))
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    fn extract_headers(headers: &http::HeaderMap) -> HashMap<String, String> {
        let mut extracted: HashMap<String, String> = HashMap::new();
        for (name, value) in headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            extracted
                .entry(name.to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        extracted
    }

    async fn exchange(&self, request: http::Request<Full<Bytes>>) -> Result<Response<Bytes>> {
        let response = self
            .inner
            .request(request)
            .await
            .map_err(|e| Self::map_hyper_error(&e))?;

        let status = response.status().as_u16();
        let headers = Self::extract_headers(response.headers());

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::connection(e.to_string()))?
            .to_bytes();

        Ok(Response::new(status, headers, body))
    }

    /// Send one request.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedScheme`] for anything but `http` and `https`
    /// - [`Error::Cancelled`] or [`Error::Timeout`] when the request context
    ///   ends first
    /// - [`Error::Timeout`] when the executor timeout elapses
    /// - [`Error::Tls`] for a certificate from an unknown authority,
    ///   [`Error::Connection`] for any other network failure
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let (method, url, headers, body, context) = request.into_parts();

        if let Some(err) = context.error() {
            return Err(err);
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::UnsupportedScheme(url.scheme().to_string()));
        }

        let hyper_request = Self::build_hyper_request(method, &url, &headers, body)?;
        let exchange = tokio::time::timeout(self.timeout, self.exchange(hyper_request));

        tokio::select! {
            biased;
            err = context.done() => Err(err),
            result = exchange => result.unwrap_or_else(|_| Err(Error::Timeout)),
        }
    }

    fn map_hyper_error(err: &hyper_util::client::legacy::Error) -> Error {
        let mut message = err.to_string();
        let mut untrusted = false;
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            untrusted |= is_unknown_issuer(cause);
            source = cause.source();
        }

        if untrusted {
            return Error::tls(message);
        }

        Error::connection(message)
    }
}

/// The peer certificate is signed by an authority missing from the trust store.
///
/// rustls errors reach hyper wrapped in an `io::Error`, whose `source` skips
/// the wrapped value, so the wrapper is opened explicitly.
fn is_unknown_issuer(cause: &(dyn std::error::Error + 'static)) -> bool {
    let rustls_error = cause.downcast_ref::<rustls::Error>().or_else(|| {
        cause
            .downcast_ref::<std::io::Error>()
            .and_then(std::io::Error::get_ref)
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    });

    matches!(
        rustls_error,
        Some(rustls::Error::InvalidCertificate(
            rustls::CertificateError::UnknownIssuer
        ))
    )
}

impl Service<Request<Bytes>> for HyperTransport {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.execute(request).await })
    }
}
