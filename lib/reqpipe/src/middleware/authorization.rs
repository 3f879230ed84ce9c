//! Authorization header from a [`TokenRefresher`].
//!
//! Adds `Authorization: <schema> <token>` to every request. When the refresher
//! holds an error instead of a token, the request goes out without the header
//! and a warning is logged.

use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::warn;

use super::TokenRefresher;
use crate::{Error, Request, Response, Result, pipeline::ServiceFuture};

/// Layer that authorizes requests with a refreshed token.
#[derive(Debug, Clone)]
pub struct AuthorizationLayer {
    refresher: TokenRefresher,
}

impl AuthorizationLayer {
    /// Authorize with tokens from `refresher`.
    #[must_use]
    pub const fn new(refresher: TokenRefresher) -> Self {
        Self { refresher }
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = Authorization<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Authorization {
            inner,
            refresher: self.refresher.clone(),
        }
    }
}

/// Service that authorizes requests with a refreshed token.
#[derive(Debug, Clone)]
pub struct Authorization<S> {
    inner: S,
    refresher: TokenRefresher,
}

impl<S> Service<Request<Bytes>> for Authorization<S>
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

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let refresher = self.refresher.clone();

        Box::pin(async move {
            match refresher.get().await {
                Ok(token) => {
                    request.set_header(
                        "Authorization",
                        format!("{} {token}", refresher.schema()),
                    );
                }
                Err(err) => {
                    warn!(
                        method = %request.method(),
                        url = %request.url(),
                        error = %err,
                        "no token will be added to the request"
                    );
                }
            }
            inner.call(request).await
        })
    }
}
