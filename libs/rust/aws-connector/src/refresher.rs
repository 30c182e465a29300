//! Background refresh of session credentials.
//!
//! A [`CredentialsRefresher`] owns a [`SessionCredentialsHolder`] and a Tokio
//! task that refreshes it on a fixed period derived from the session lifetime.
//! The task is cancelled exactly once, on [`CredentialsRefresher::shutdown`]
//! or when the refresher is dropped.

use crate::config::{ConnectorConfig, DEFAULT_REFRESH_FRACTION, MAX_REFRESH_FRACTION};
use crate::credentials::Credentials;
use crate::error::{CredentialsError, RefreshFailure};
use crate::holder::{CredentialsHolder, SessionCredentialsHolder};
use crate::provider::TokenExchangeService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_common::metrics::{Metric, render};
use rust_common::{Counter, Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Counters for the refresh task.
#[derive(Debug)]
pub struct RefreshMetrics {
    /// Scheduled refreshes run
    pub ticks: Counter,
    /// Scheduled refreshes that failed
    pub failures: Counter,
    /// Failed refreshes the provider will keep refusing until the base credentials change
    pub rejections: Counter,
    /// Seconds until the current session expires, as of the last tick
    pub seconds_until_expiry: Gauge,
}

impl Default for RefreshMetrics {
    fn default() -> Self {
        Self {
            ticks: Counter::new(
                "aws_session_refresh_total",
                "Scheduled session credential refreshes",
            ),
            failures: Counter::new(
                "aws_session_refresh_failures_total",
                "Scheduled session credential refreshes that failed",
            ),
            rejections: Counter::new(
                "aws_session_refresh_rejections_total",
                "Scheduled session credential refreshes refused for a non-transient reason",
            ),
            seconds_until_expiry: Gauge::new(
                "aws_session_seconds_until_expiry",
                "Seconds until the current session credentials expire",
            ),
        }
    }
}

impl RefreshMetrics {
    /// Render as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        render(&[
            &self.ticks as &dyn Metric,
            &self.failures,
            &self.rejections,
            &self.seconds_until_expiry,
        ])
    }

    fn record_expiry(&self, expires_at: Option<DateTime<Utc>>) {
        if let Some(expires_at) = expires_at {
            let remaining = (expires_at - Utc::now()).num_seconds().max(0);
            self.seconds_until_expiry
                .set(u64::try_from(remaining).unwrap_or_default());
        }
    }
}

/// Owns the refresh task; aborts it at most once.
#[derive(Debug)]
struct RefreshTask {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Session credentials kept fresh by a background task.
#[derive(Debug)]
pub struct CredentialsRefresher {
    holder: Arc<SessionCredentialsHolder>,
    interval: Duration,
    metrics: Arc<RefreshMetrics>,
    task: RefreshTask,
}

impl CredentialsRefresher {
    /// Refresh period for a session of `session_duration`.
    ///
    /// A fixed fraction of the lifetime, never below the configured floor and
    /// always short of the lifetime itself.
    #[must_use]
    pub fn refresh_interval_for(session_duration: Duration, config: &ConnectorConfig) -> Duration {
        let fraction = if config.refresh_fraction.is_finite() {
            config.refresh_fraction.clamp(0.0, MAX_REFRESH_FRACTION)
        } else {
            DEFAULT_REFRESH_FRACTION
        };
        session_duration
            .mul_f64(fraction)
            .max(config.min_refresh_interval)
            .min(session_duration.mul_f64(MAX_REFRESH_FRACTION))
    }

    /// Obtain a first session from `base` and start refreshing it.
    ///
    /// If the first exchange fails nothing is scheduled.
    ///
    /// # Errors
    ///
    /// See [`SessionCredentialsHolder::new`].
    pub async fn build(
        base: Arc<dyn CredentialsHolder>,
        sts: Arc<dyn TokenExchangeService>,
        session_duration: Duration,
        config: &ConnectorConfig,
    ) -> Result<Self, CredentialsError> {
        let holder = SessionCredentialsHolder::new(base, sts, session_duration).await?;
        Ok(Self::start(Arc::new(holder), config))
    }

    /// Start refreshing `holder`.
    ///
    /// Must be called from within a Tokio runtime. The first refresh happens
    /// one period after the call.
    #[must_use]
    pub fn start(holder: Arc<SessionCredentialsHolder>, config: &ConnectorConfig) -> Self {
        let interval = Self::refresh_interval_for(holder.session_duration(), config);
        let metrics = Arc::new(RefreshMetrics::default());
        metrics.record_expiry(holder.session_expiration());

        let handle = tokio::spawn(refresh_loop(holder.clone(), interval, metrics.clone()));
        info!(interval_secs = interval.as_secs(), "Started session credentials refresh");

        Self {
            holder,
            interval,
            metrics,
            task: RefreshTask {
                handle: Some(handle),
            },
        }
    }

    /// Stop the refresh task. Returns `false` if it was already stopped.
    pub fn shutdown(&mut self) -> bool {
        let cancelled = self.task.cancel();
        if cancelled {
            info!("Stopped session credentials refresh");
        }
        cancelled
    }

    /// Whether the refresh task is still scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Refresh period.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        self.interval
    }

    /// Refresh counters.
    #[must_use]
    pub fn metrics(&self) -> &RefreshMetrics {
        &self.metrics
    }

    /// The refreshed holder.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionCredentialsHolder> {
        &self.holder
    }
}

async fn refresh_loop(
    holder: Arc<SessionCredentialsHolder>,
    period: Duration,
    metrics: Arc<RefreshMetrics>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        metrics.ticks.inc();

        match holder.try_refresh().await {
            Ok(()) => debug!("Scheduled session refresh succeeded"),
            Err(e) if e.is_retryable() => {
                metrics.failures.inc();
                warn!(error = %e, "Scheduled session refresh failed, keeping the current session");
            }
            Err(e) => {
                metrics.failures.inc();
                metrics.rejections.inc();
                error!(error = %e, "Session refresh rejected, keeping the current session until it expires");
            }
        }
        metrics.record_expiry(holder.session_expiration());
    }
}

#[async_trait]
impl CredentialsHolder for CredentialsRefresher {
    fn credentials(&self) -> Credentials {
        self.holder.credentials()
    }

    async fn refresh(&self) {
        self.holder.refresh().await;
    }

    fn session_expiration(&self) -> Option<DateTime<Utc>> {
        self.holder.session_expiration()
    }

    fn last_refresh_failure(&self) -> Option<RefreshFailure> {
        self.holder.last_refresh_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_fraction_of_duration() {
        let config = ConnectorConfig::default();
        assert_eq!(
            CredentialsRefresher::refresh_interval_for(Duration::from_secs(3600), &config),
            Duration::from_secs(2880)
        );
    }

    #[test]
    fn test_interval_respects_floor() {
        let config = ConnectorConfig::default()
            .with_refresh_fraction(0.5)
            .with_min_refresh_interval(Duration::from_secs(600));
        assert_eq!(
            CredentialsRefresher::refresh_interval_for(Duration::from_secs(900), &config),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_interval_stays_short_of_the_session() {
        let config = ConnectorConfig::default().with_min_refresh_interval(Duration::from_secs(1000));
        assert_eq!(
            CredentialsRefresher::refresh_interval_for(Duration::from_secs(900), &config),
            Duration::from_secs(855)
        );
    }

    #[test]
    fn test_interval_with_nan_fraction_uses_default() {
        let config = ConnectorConfig {
            refresh_fraction: f64::NAN,
            ..ConnectorConfig::default()
        };
        assert_eq!(
            CredentialsRefresher::refresh_interval_for(Duration::from_secs(3600), &config),
            Duration::from_secs(2880)
        );
    }

    #[test]
    fn test_metrics_render() {
        let metrics = RefreshMetrics::default();
        metrics.ticks.inc();
        let text = metrics.to_prometheus();
        assert!(text.contains("aws_session_refresh_total 1"));
        assert!(text.contains("aws_session_refresh_failures_total 0"));
        assert!(text.contains("aws_session_refresh_rejections_total 0"));
    }
}
