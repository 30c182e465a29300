//! Credential values.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// An access key pair, optionally with a session token.
///
/// Immutable. The secret parts are wrapped in [`SecretString`] so they never
/// show up in `Debug` output or logs.
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
}

impl Credentials {
    /// Long-lived credentials.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: None,
        }
    }

    /// Attach a session token, making these temporary credentials.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SecretString::from(token.into()));
        self
    }

    /// Access key ID.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Secret access key.
    #[must_use]
    pub const fn secret_access_key(&self) -> &SecretString {
        &self.secret_access_key
    }

    /// Session token, for temporary credentials.
    #[must_use]
    pub const fn session_token(&self) -> Option<&SecretString> {
        self.session_token.as_ref()
    }

    /// Whether these are session credentials.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        self.session_token.is_some()
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.access_key_id == other.access_key_id
            && self.secret_access_key.expose_secret() == other.secret_access_key.expose_secret()
            && self.session_token.as_ref().map(|t| t.expose_secret())
                == other.session_token.as_ref().map(|t| t.expose_secret())
    }
}

impl Eq for Credentials {}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Credentials together with the instant they stop working.
///
/// Replaced wholesale on refresh, so readers always see a consistent pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsSnapshot {
    /// The credentials
    pub credentials: Credentials,
    /// Expiry; `None` for credentials that do not expire
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialsSnapshot {
    /// Credentials that expire at `expires_at`.
    #[must_use]
    pub const fn expiring(credentials: Credentials, expires_at: DateTime<Utc>) -> Self {
        Self {
            credentials,
            expires_at: Some(expires_at),
        }
    }

    /// Credentials without an expiry.
    #[must_use]
    pub const fn non_expiring(credentials: Credentials) -> Self {
        Self {
            credentials,
            expires_at: None,
        }
    }

    /// Whether the credentials have expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Time left until expiry at `now`, zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - now).to_std().unwrap_or_default())
    }
}
