//! Redirect following on top of the transport.
//!
//! Follows 301, 302, 303, 307 and 308 with a `Location` header. 301, 302 and
//! 303 switch anything but GET and HEAD to GET and drop the body; 307 and 308
//! resend the same method and body. `Authorization` is not forwarded to a
//! different host.

use std::task::{Context, Poll};

use bytes::Bytes;
use http::Method;
use tower::{Layer, Service, ServiceExt};
use url::Url;

use crate::{Error, Request, Response, Result, pipeline::ServiceFuture};

/// Default maximum number of redirects to follow.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Layer that follows HTTP redirects.
#[derive(Debug, Clone)]
pub struct FollowRedirectLayer {
    max_redirects: usize,
}

impl Default for FollowRedirectLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl FollowRedirectLayer {
    /// Follow up to [`DEFAULT_MAX_REDIRECTS`] redirects.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Follow up to `max_redirects` redirects.
    #[must_use]
    pub const fn with_max_redirects(max_redirects: usize) -> Self {
        Self { max_redirects }
    }
}

impl<S> Layer<S> for FollowRedirectLayer {
    type Service = FollowRedirect<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FollowRedirect::with_max_redirects(inner, self.max_redirects)
    }
}

/// Service that follows HTTP redirects.
#[derive(Debug, Clone)]
pub struct FollowRedirect<S> {
    inner: S,
    max_redirects: usize,
}

impl<S> FollowRedirect<S> {
    /// Wrap `inner`, following up to `max_redirects` redirects.
    #[must_use]
    pub const fn with_max_redirects(inner: S, max_redirects: usize) -> Self {
        Self {
            inner,
            max_redirects,
        }
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Method for the redirected request.
fn redirect_method(status: u16, original: Method) -> Method {
    match status {
        307 | 308 => original,
        _ if original == Method::GET || original == Method::HEAD => original,
        _ => Method::GET,
    }
}

fn resolve_redirect_url(base_url: &Url, location: &str) -> Result<Url> {
    base_url.join(location).map_err(Error::InvalidUrl)
}

/// Build the follow-up request, or fail if the response cannot be followed.
fn next_request(
    request: Request<Bytes>,
    response: &Response<Bytes>,
) -> Result<Request<Bytes>> {
    let location = response.header("location").ok_or_else(|| {
        Error::InvalidRedirect("redirect response missing Location header".to_string())
    })?;
    let new_url = resolve_redirect_url(request.url(), location)?;

    let (method, url, headers, body, context) = request.into_parts();
    let new_method = redirect_method(response.status(), method);
    let keep_body = matches!(response.status(), 307 | 308);
    let same_host = url.host_str() == new_url.host_str();

    let headers = headers.into_iter().filter(|(name, _)| {
        let dropped_with_body = !keep_body
            && (name.eq_ignore_ascii_case("content-type")
                || name.eq_ignore_ascii_case("content-length"));
        let cross_host_auth = !same_host && name.eq_ignore_ascii_case("authorization");
        !dropped_with_body && !cross_host_auth
    });

    let mut builder = Request::builder(new_method, new_url)
        .headers(headers)
        .context(context);
    if keep_body && let Some(body) = body {
        builder = builder.body(body);
    }
    Ok(builder.build())
}

impl<S> Service<Request<Bytes>> for FollowRedirect<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let max_redirects = self.max_redirects;

        Box::pin(async move {
            let mut current = request;
            let mut redirects = 0;

            loop {
                let response = inner.call(current.clone()).await?;

                if !is_redirect(response.status()) {
                    return Ok(response);
                }

                if redirects >= max_redirects {
                    return Err(Error::TooManyRedirects {
                        count: redirects,
                        max: max_redirects,
                    });
                }

                current = next_request(current, &response)?;
                redirects += 1;
                tracing::debug!(url = %current.url(), redirects, "following redirect");

                inner = ServiceExt::<Request<Bytes>>::ready_oneshot(inner).await?;
            }
        })
    }
}
