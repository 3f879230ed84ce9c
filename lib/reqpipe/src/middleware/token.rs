//! Background token refresh.
//!
//! A [`TokenRefresher`] owns one spawned task that calls the authorize
//! function, publishes the result in a `watch` cell, sleeps until
//! `lifespan - LIFESPAN_SAFETY_MARGIN` (never less than
//! [`MIN_REFRESH_INTERVAL`]), and starts over. Readers clone the current value
//! out of the cell; they never trigger a refresh themselves, so any number of
//! concurrent requests cost one authorize call per cycle.
//!
//! A published token carries the instant it stops being readable: its
//! lifespan minus the safety margin, or the bare lifespan when that is
//! shorter than the margin. Past that instant readers wait for the next value
//! instead of reading the old one. A token with no lifespan at all is
//! published as an authorization error.
//!
//! The task stops once every clone of the refresher is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::{Error, Result};

/// Subtracted from a credential's lifespan to schedule the refresh.
pub const LIFESPAN_SAFETY_MARGIN: Duration = Duration::from_secs(1);

/// Lower bound between two authorize calls.
///
/// Keeps a failing or zero-lifespan authorize function from spinning.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Token returned by an authorize function, with how long it stays valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Token value, without the schema.
    pub token: String,
    /// Validity counted from the moment the token was issued.
    pub lifespan: Duration,
}

impl Credential {
    /// Create a credential.
    #[must_use]
    pub fn new(token: impl Into<String>, lifespan: Duration) -> Self {
        Self {
            token: token.into(),
            lifespan,
        }
    }
}

/// Result of one authorize call, as seen by readers.
pub type TokenResult = std::result::Result<Arc<str>, Arc<Error>>;

#[derive(Debug, Clone)]
struct TokenInfo {
    token: TokenResult,
    valid_until: Instant,
}

impl TokenInfo {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.valid_until
    }
}

/// Shared, self-renewing credential.
///
/// Cloning is cheap; all clones read the same cell.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use reqpipe::middleware::{Credential, TokenRefresher};
///
/// # async fn run() {
/// let refresher = TokenRefresher::new("Bearer", || async {
///     Ok(Credential::new("secret", Duration::from_secs(3600)))
/// });
///
/// let token = refresher.get().await.expect("token");
/// assert_eq!(&*token, "secret");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    schema: Arc<str>,
    current: watch::Receiver<Option<TokenInfo>>,
}

impl TokenRefresher {
    /// Start refreshing with `authorize`.
    ///
    /// `schema` prefixes the token in the `Authorization` header, as in
    /// `Bearer <token>`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new<F, Fut>(schema: impl Into<String>, authorize: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Credential>> + Send + 'static,
    {
        let (sender, current) = watch::channel(None);
        tokio::spawn(refresh_loop(sender, authorize));

        Self {
            schema: Arc::from(schema.into()),
            current,
        }
    }

    /// Authorization schema.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Current token, or the error of the last authorize call.
    ///
    /// Waits for the first authorize call to finish, and for the refresh when
    /// the current value is past its refresh instant.
    pub async fn get(&self) -> TokenResult {
        let mut current = self.current.clone();
        let info = current
            .wait_for(|info| info.as_ref().is_some_and(TokenInfo::is_fresh))
            .await;

        match info.as_deref() {
            Ok(Some(info)) => info.token.clone(),
            _ => Err(Arc::new(Error::authorization("token refresher stopped"))),
        }
    }
}

/// A token is readable for its lifespan minus the safety margin, or for its
/// whole lifespan when that is shorter than the margin.
fn published(token: Arc<str>, lifespan: Duration, now: Instant) -> TokenInfo {
    let margin_left = lifespan.saturating_sub(LIFESPAN_SAFETY_MARGIN);
    let validity = if margin_left.is_zero() {
        lifespan
    } else {
        margin_left
    };

    if validity.is_zero() {
        warn!("authorize returned a token that is already expired");
        return failed(
            Error::authorization("authorize returned an expired token"),
            now,
        );
    }

    TokenInfo {
        token: Ok(token),
        valid_until: now + validity,
    }
}

/// Errors stay readable until the next authorize call.
fn failed(err: Error, now: Instant) -> TokenInfo {
    TokenInfo {
        token: Err(Arc::new(err)),
        valid_until: now + MIN_REFRESH_INTERVAL,
    }
}

async fn refresh_loop<F, Fut>(sender: watch::Sender<Option<TokenInfo>>, authorize: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Credential>>,
{
    loop {
        let outcome = tokio::select! {
            outcome = authorize() => outcome,
            () = sender.closed() => break,
        };

        let now = Instant::now();
        let (info, lifespan) = match outcome {
            Ok(credential) => {
                let lifespan = credential.lifespan;
                (published(Arc::from(credential.token), lifespan, now), lifespan)
            }
            Err(err) => {
                error!(error = %err, "could not retrieve access token");
                (failed(err, now), Duration::ZERO)
            }
        };

        let wait = lifespan
            .saturating_sub(LIFESPAN_SAFETY_MARGIN)
            .max(MIN_REFRESH_INTERVAL);
        sender.send_replace(Some(info));

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = sender.closed() => break,
        }
    }

    debug!("token refresher dropped, refresh loop stopped");
}
