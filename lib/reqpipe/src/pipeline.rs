//! Handler and middleware abstraction.
//!
//! A [`Handler`] performs one request/response exchange. A [`Middleware`]
//! wraps a handler into a new handler. A [`Pipeline`] keeps middleware in
//! attachment order and folds a terminal handler through all of them, so the
//! first attached middleware is the outermost: it sees the request first and
//! the response last.
//!
//! # Example
//!
//! ```
//! use reqpipe::{Middleware, Pipeline, handler_fn};
//! use reqpipe::Response;
//!
//! let terminal = handler_fn(|_request| async {
//!     Ok(Response::new(204, Default::default(), Default::default()))
//! });
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.attach(Middleware::from_fn(|next| next));
//! let handler = pipeline.compose(terminal);
//! # let _ = handler;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};

use crate::{Error, Request, Response, Result};

/// Type-erased handler: one request in, one response or error out.
pub type Handler = BoxCloneService<Request<Bytes>, Response<Bytes>, Error>;

/// Future returned by handlers and by the executor's `Service` implementation.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response<Bytes>>> + Send + 'static>>;

/// Turn an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Request<Bytes>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Response<Bytes>>> + Send + 'static,
{
    BoxCloneService::new(tower::service_fn(f))
}

/// A `Handler -> Handler` transformation.
///
/// Middleware carries no per-request state of its own; shared state such as a
/// cache store or a token refresher is captured by the wrapping closure.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<dyn Fn(Handler) -> Handler + Send + Sync>,
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

impl Middleware {
    /// Middleware from a plain function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self { wrap: Arc::new(f) }
    }

    /// Middleware from a tower [`Layer`].
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request<Bytes>>>::Future: Send + 'static,
    {
        Self::from_fn(move |inner| BoxCloneService::new(layer.layer(inner)))
    }

    /// Wrap `inner`.
    #[must_use]
    pub fn wrap(&self, inner: Handler) -> Handler {
        (self.wrap)(inner)
    }
}

/// Ordered middleware list.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    middlewares: Vec<Middleware>,
}

impl Pipeline {
    /// An empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware. It becomes the innermost one so far.
    pub fn attach(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Number of attached middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if no middleware is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Fold `terminal` through every middleware, first attached outermost.
    #[must_use]
    pub fn compose(&self, terminal: Handler) -> Handler {
        self.middlewares
            .iter()
            .rev()
            .fold(terminal, |inner, middleware| middleware.wrap(inner))
    }
}

/// A composed handler that can be called through `&self`.
///
/// [`Handler`] is `Send` but not `Sync`; each call clones it under a short
/// lock and drives the clone to completion.
#[derive(Clone)]
pub(crate) struct SharedHandler {
    inner: Arc<Mutex<Handler>>,
}

impl SharedHandler {
    pub(crate) fn new(handler: Handler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handler)),
        }
    }

    pub(crate) fn get(&self) -> Handler {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn call(&self, request: Request<Bytes>) -> ServiceFuture {
        Box::pin(self.get().oneshot(request))
    }
}
