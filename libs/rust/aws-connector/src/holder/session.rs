use super::CredentialsHolder;
use crate::credentials::{Credentials, CredentialsSnapshot};
use crate::error::{CredentialsError, ProviderError, RefreshFailure};
use crate::params::{MAX_SESSION_DURATION, MIN_SESSION_DURATION, mask_key};
use crate::provider::TokenExchangeService;
use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Session credentials obtained by exchanging a base holder's credentials.
///
/// The current session is an atomically swapped snapshot: readers never block
/// and never observe credentials paired with another session's expiry.
pub struct SessionCredentialsHolder {
    base: Arc<dyn CredentialsHolder>,
    sts: Arc<dyn TokenExchangeService>,
    duration: Duration,
    current: ArcSwap<CredentialsSnapshot>,
    last_failure: ArcSwapOption<RefreshFailure>,
}

impl SessionCredentialsHolder {
    /// Exchange the base credentials for a first session lasting `duration`.
    ///
    /// # Errors
    ///
    /// [`CredentialsError::InvalidSessionDuration`] when `duration` is outside
    /// the provider limits, [`CredentialsError::SessionExchange`] when the
    /// initial exchange fails.
    pub async fn new(
        base: Arc<dyn CredentialsHolder>,
        sts: Arc<dyn TokenExchangeService>,
        duration: Duration,
    ) -> Result<Self, CredentialsError> {
        if !(MIN_SESSION_DURATION..=MAX_SESSION_DURATION).contains(&duration) {
            return Err(CredentialsError::InvalidSessionDuration {
                requested: duration,
                min: MIN_SESSION_DURATION,
                max: MAX_SESSION_DURATION,
            });
        }

        let base_credentials = base.credentials();
        let snapshot = sts
            .get_session_token(&base_credentials, duration)
            .await
            .map_err(CredentialsError::SessionExchange)?;

        debug!(
            access_key = %mask_key(base_credentials.access_key_id()),
            expires_at = ?snapshot.expires_at,
            "Obtained session credentials"
        );

        Ok(Self {
            base,
            sts,
            duration,
            current: ArcSwap::from_pointee(snapshot),
            last_failure: ArcSwapOption::empty(),
        })
    }

    /// The current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CredentialsSnapshot> {
        self.current.load_full()
    }

    /// Requested session lifetime.
    #[must_use]
    pub const fn session_duration(&self) -> Duration {
        self.duration
    }

    /// Exchange again and swap in the new session.
    ///
    /// On failure the previous session stays in place and the failure is
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns the provider error of the failed exchange.
    pub async fn try_refresh(&self) -> Result<(), ProviderError> {
        self.base.refresh().await;

        match self
            .sts
            .get_session_token(&self.base.credentials(), self.duration)
            .await
        {
            Ok(snapshot) => {
                debug!(expires_at = ?snapshot.expires_at, "Refreshed session credentials");
                self.current.store(Arc::new(snapshot));
                self.last_failure.store(None);
                Ok(())
            }
            Err(e) => {
                self.last_failure
                    .store(Some(Arc::new(RefreshFailure::now(e.to_string()))));
                Err(e)
            }
        }
    }
}

impl fmt::Debug for SessionCredentialsHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentialsHolder")
            .field("duration", &self.duration)
            .field("current", &self.current.load_full())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialsHolder for SessionCredentialsHolder {
    fn credentials(&self) -> Credentials {
        self.current.load().credentials.clone()
    }

    async fn refresh(&self) {
        if let Err(e) = self.try_refresh().await {
            warn!(error = %e, "Failed to refresh session credentials, keeping the current session");
        }
    }

    fn session_expiration(&self) -> Option<DateTime<Utc>> {
        self.current.load().expires_at
    }

    fn last_refresh_failure(&self) -> Option<RefreshFailure> {
        self.last_failure.load_full().map(|failure| (*failure).clone())
    }
}
