//! In-memory response cache for GET requests.
//!
//! The key is the full request URL, lower-cased, query string included. Only
//! `GET` requests look at the cache; everything else goes straight through.
//! Entries live for the store's TTL and an expired entry is never served.
//!
//! Removal is lazy: there is no background task. Each lookup or store runs a
//! sweep when the last one is more than `2 × TTL` old, so an idle executor
//! keeps its expired entries until the next GET, or until
//! [`CacheStore::purge_expired`] is called.
//!
//! What gets stored is decided by the [`CachePolicy`].

use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use http::Method;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::debug;

use crate::{Error, Request, Response, Result, pipeline::ServiceFuture};

/// Which responses are written to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Store 2xx responses.
    #[default]
    Successes,
    /// Store responses with a non-2xx status.
    ///
    /// Transport errors carry no response and are never stored.
    Failures,
}

impl CachePolicy {
    fn should_store(self, response: &Response<Bytes>) -> bool {
        match self {
            Self::Successes => response.is_success(),
            Self::Failures => !response.is_success(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    response: Response<Bytes>,
    inserted_at: Instant,
}

/// Concurrent TTL store shared by every request through one executor.
#[derive(Debug)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    last_sweep: Mutex<Instant>,
}

impl CacheStore {
    /// Empty store whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Response<Bytes>> {
        self.sweep_if_due();
        self.entries
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.response.clone())
    }

    /// Store `response` under `key`, replacing any previous entry.
    pub fn insert(&self, key: String, response: Response<Bytes>) {
        self.sweep_if_due();
        self.entries.insert(
            key,
            CacheEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, expired ones included until the next sweep.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry now.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    fn sweep_if_due(&self) {
        let mut last_sweep = self
            .last_sweep
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if last_sweep.elapsed() < self.ttl.saturating_mul(2) {
            return;
        }
        *last_sweep = Instant::now();
        drop(last_sweep);

        self.purge_expired();
    }
}

/// Cache key: the full URL, lower-cased.
#[must_use]
pub fn cache_key(url: &url::Url) -> String {
    url.as_str().to_lowercase()
}

/// Layer that serves GET requests from a [`CacheStore`].
#[derive(Debug, Clone)]
pub struct CacheLayer {
    store: Arc<CacheStore>,
    policy: CachePolicy,
}

impl CacheLayer {
    /// Cache with a fresh store.
    #[must_use]
    pub fn new(ttl: Duration, policy: CachePolicy) -> Self {
        Self::with_store(Arc::new(CacheStore::new(ttl)), policy)
    }

    /// Cache backed by an existing store.
    #[must_use]
    pub const fn with_store(store: Arc<CacheStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }
}

impl<S> Layer<S> for CacheLayer {
    type Service = Cache<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cache {
            inner,
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

/// Service that serves GET requests from a [`CacheStore`].
#[derive(Debug, Clone)]
pub struct Cache<S> {
    inner: S,
    store: Arc<CacheStore>,
    policy: CachePolicy,
}

impl<S> Service<Request<Bytes>> for Cache<S>
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

        if *request.method() != Method::GET {
            return Box::pin(inner.call(request));
        }

        let key = cache_key(request.url());
        if let Some(response) = self.store.get(&key) {
            debug!(%key, "cache hit");
            return Box::pin(async move { Ok(response) });
        }

        let store = Arc::clone(&self.store);
        let policy = self.policy;
        Box::pin(async move {
            let result = inner.call(request).await;
            if let Ok(response) = &result
                && policy.should_store(response)
            {
                debug!(%key, status = response.status(), "caching response");
                store.insert(key, response.clone());
            }
            result
        })
    }
}
