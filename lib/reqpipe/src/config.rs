//! Executor configuration types.

use std::time::Duration;

/// Configuration for a [`RequestExecutor`](crate::RequestExecutor).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline for one exchange, headers and body included.
    pub timeout: Duration,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// Redirects followed before giving up with
    /// [`Error::TooManyRedirects`](crate::Error::TooManyRedirects).
    pub max_redirects: usize,
    /// Lower bound handed to the retry backoff.
    pub min_retry_wait: Duration,
    /// Upper bound handed to the retry backoff.
    pub max_retry_wait: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            max_redirects: 10,
            min_retry_wait: Duration::from_millis(500),
            max_retry_wait: Duration::from_secs(10),
        }
    }
}

impl ExecutorConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }
}

/// Builder for [`ExecutorConfig`].
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
    max_redirects: Option<usize>,
    min_retry_wait: Option<Duration>,
    max_retry_wait: Option<Duration>,
}

impl ExecutorConfigBuilder {
    /// Set the exchange timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of redirects to follow.
    #[must_use]
    pub const fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// Set the minimum wait between retries.
    #[must_use]
    pub const fn min_retry_wait(mut self, wait: Duration) -> Self {
        self.min_retry_wait = Some(wait);
        self
    }

    /// Set the maximum wait between retries.
    #[must_use]
    pub const fn max_retry_wait(mut self, wait: Duration) -> Self {
        self.max_retry_wait = Some(wait);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
            max_redirects: self.max_redirects.unwrap_or(defaults.max_redirects),
            min_retry_wait: self.min_retry_wait.unwrap_or(defaults.min_retry_wait),
            max_retry_wait: self.max_retry_wait.unwrap_or(defaults.max_retry_wait),
        }
    }
}
