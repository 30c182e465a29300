//! Credentials holders
//!
//! Every way of obtaining credentials is exposed through the same capability:
//! hand out the current credentials, refresh them, and report when they
//! expire. Consumers never need to know which variant they hold.

mod default_chain;
mod session;
mod static_holder;

pub use default_chain::DefaultChainCredentialsHolder;
pub use session::SessionCredentialsHolder;
pub use static_holder::StaticCredentialsHolder;

use crate::credentials::Credentials;
use crate::error::RefreshFailure;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Supplies credentials and can renew them.
#[async_trait]
pub trait CredentialsHolder: fmt::Debug + Send + Sync {
    /// The current credentials.
    fn credentials(&self) -> Credentials;

    /// Renew the credentials where the variant supports it.
    ///
    /// Never fails: a failed refresh keeps the previous credentials and is
    /// reported through [`CredentialsHolder::last_refresh_failure`].
    async fn refresh(&self);

    /// When the current credentials expire, `None` if they do not.
    fn session_expiration(&self) -> Option<DateTime<Utc>>;

    /// The most recent refresh failure, cleared by the next successful refresh.
    fn last_refresh_failure(&self) -> Option<RefreshFailure> {
        None
    }
}

#[async_trait]
impl<T: CredentialsHolder + ?Sized> CredentialsHolder for Arc<T> {
    fn credentials(&self) -> Credentials {
        (**self).credentials()
    }

    async fn refresh(&self) {
        (**self).refresh().await;
    }

    fn session_expiration(&self) -> Option<DateTime<Utc>> {
        (**self).session_expiration()
    }

    fn last_refresh_failure(&self) -> Option<RefreshFailure> {
        (**self).last_refresh_failure()
    }
}
