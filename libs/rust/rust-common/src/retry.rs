//! Duration-bounded retry executor with pluggable pacing.
//!
//! The [`Retrier`] re-runs an operation until it succeeds or its wall-clock
//! budget is spent. It never classifies errors: every failure is retried
//! until the deadline. Pacing (fixed delay, exponential backoff, jitter) and
//! observation are both expressed as [`RetrierEventListener`]s, so the loop
//! itself never changes.

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Observer hooks around a retried operation.
///
/// Every hook is a no-op by default, implementors override only what they need.
/// `retry` is zero-based: the first attempt is retry `0`.
#[async_trait]
pub trait RetrierEventListener: Send + Sync {
    /// Called once before the first attempt.
    fn before_execution(&self) {}

    /// Called once after the last attempt, whatever its outcome.
    fn after_execution(&self) {}

    /// Called before every attempt except the first one.
    ///
    /// Pacing listeners sleep here.
    async fn before_retry(&self, _retry: u32) {}

    /// Called when attempt `retry` succeeds.
    fn on_success(&self, _retry: u32) {}

    /// Called when attempt `retry` fails.
    fn on_failure(&self, _retry: u32, _error: &(dyn StdError + 'static)) {}
}

/// The retry budget was exhausted.
///
/// Wraps the most recent failure, which stays reachable through
/// [`std::error::Error::source`].
#[derive(Error, Debug)]
#[error("gave up after {attempts} attempts in {elapsed:?}: {source}")]
pub struct RetryTimeout<E> {
    /// Number of attempts made
    pub attempts: u32,
    /// Wall-clock time spent in the retry loop
    pub elapsed: Duration,
    /// The last failure reported by the operation
    #[source]
    pub source: E,
}

impl<E> RetryTimeout<E> {
    /// The last failure reported by the operation.
    #[must_use]
    pub const fn last_error(&self) -> &E {
        &self.source
    }

    /// Consume the timeout, returning the last failure.
    #[must_use]
    pub fn into_last_error(self) -> E {
        self.source
    }
}

/// Executes an operation until it succeeds or `timeout` has elapsed.
///
/// No attempt count is enforced, only the time budget. An attempt that is
/// already running when the budget runs out is not interrupted; the budget is
/// checked after each failure, so the loop may overrun by one pacing delay.
#[derive(Clone, Default)]
pub struct Retrier {
    timeout: Duration,
    listeners: Vec<Arc<dyn RetrierEventListener>>,
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("timeout", &self.timeout)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Retrier {
    /// Create a retrier with the given wall-clock budget and no listeners.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            listeners: Vec::new(),
        }
    }

    /// Create a retrier with a budget expressed in whole seconds.
    #[must_use]
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Register a listener. Listeners are notified in registration order.
    #[must_use]
    pub fn register_listener<L>(mut self, listener: L) -> Self
    where
        L: RetrierEventListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Register a listener that is shared with the caller.
    #[must_use]
    pub fn register_shared_listener(mut self, listener: Arc<dyn RetrierEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The wall-clock budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` until it succeeds or the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`RetryTimeout`] wrapping the last failure once the elapsed
    /// time reaches the budget.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, RetryTimeout<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        for listener in &self.listeners {
            listener.before_execution();
        }

        let started = Instant::now();
        let mut retry = 0_u32;

        let outcome = loop {
            if retry > 0 {
                for listener in &self.listeners {
                    listener.before_retry(retry).await;
                }
            }

            match operation().await {
                Ok(value) => {
                    for listener in &self.listeners {
                        listener.on_success(retry);
                    }
                    break Ok(value);
                }
                Err(error) => {
                    for listener in &self.listeners {
                        listener.on_failure(retry, &error);
                    }

                    let elapsed = started.elapsed();
                    if elapsed >= self.timeout {
                        break Err(RetryTimeout {
                            attempts: retry + 1,
                            elapsed,
                            source: error,
                        });
                    }
                    retry += 1;
                }
            }
        };

        for listener in &self.listeners {
            listener.after_execution();
        }

        outcome
    }
}

/// Fixed pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct DelayListener {
    delay: Duration,
}

impl DelayListener {
    /// Pause for `delay` before every retry.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Pause for `millis` milliseconds before every retry.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// The configured pause.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl RetrierEventListener for DelayListener {
    async fn before_retry(&self, _retry: u32) {
        tokio::time::sleep(self.delay).await;
    }
}

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Exponential backoff between attempts, optionally jittered.
#[derive(Debug, Clone, Default)]
pub struct ExponentialBackoffListener {
    config: RetryConfig,
}

impl ExponentialBackoffListener {
    /// Create a backoff listener from the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Calculate the delay preceding retry number `retry` (one-based).
    ///
    /// Uses exponential backoff with up to 25% jitter.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        let final_delay = if self.config.jitter {
            let jitter_factor = 1.0 + (rand::random::<f64>() * 0.25);
            delay_ms * jitter_factor
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }
}

#[async_trait]
impl RetrierEventListener for ExponentialBackoffListener {
    async fn before_retry(&self, retry: u32) {
        tokio::time::sleep(self.delay_for_retry(retry)).await;
    }
}

/// Emits a tracing event for every failed attempt and for late successes.
#[derive(Debug, Clone)]
pub struct TracingListener {
    operation: String,
}

impl TracingListener {
    /// Label events with `operation`.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }
}

#[async_trait]
impl RetrierEventListener for TracingListener {
    fn on_success(&self, retry: u32) {
        if retry > 0 {
            info!(operation = %self.operation, retries = retry, "Operation succeeded after retrying");
        }
    }

    fn on_failure(&self, retry: u32, error: &(dyn StdError + 'static)) {
        debug!(operation = %self.operation, attempt = retry + 1, error = %error, "Attempt failed");
    }
}
