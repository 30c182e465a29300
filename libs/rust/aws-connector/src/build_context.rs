//! Exposing connection credentials to a build.
//!
//! A build receives the credentials twice: as environment variables and as a
//! base64 encoded credentials-profile document it can write to disk.

use crate::error::CredentialsError;
use crate::factory::CredentialsFactory;
use crate::params::{REGION_NAME_PARAM, mask_key};
use crate::store::ConnectionRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Environment variable for the access key ID.
pub const ACCESS_KEY_ID_ENV: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable for the secret access key.
pub const SECRET_ACCESS_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable for the session token.
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";
/// Environment variable for the region.
pub const DEFAULT_REGION_ENV: &str = "AWS_DEFAULT_REGION";

const PROFILE_HEADER: &str = "[default]";

/// Credentials prepared for a build.
#[derive(Clone, PartialEq, Eq)]
pub struct ExposedCredentials {
    /// Environment variables to set
    pub environment: BTreeMap<String, String>,
    /// Names of variables whose values must be masked in build output
    pub password_parameters: Vec<String>,
    /// Base64 encoded `[default]` credentials profile
    pub encoded_profile: String,
    /// When the credentials stop working, `None` if they do not expire
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for ExposedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let environment: BTreeMap<&str, &str> = self
            .environment
            .iter()
            .map(|(name, value)| {
                if self.password_parameters.contains(name) {
                    (name.as_str(), "[REDACTED]")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();

        f.debug_struct("ExposedCredentials")
            .field("environment", &environment)
            .field("password_parameters", &self.password_parameters)
            .field("encoded_profile", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Turns a stored connection into [`ExposedCredentials`].
#[derive(Debug, Clone)]
pub struct BuildCredentialsExporter {
    factory: CredentialsFactory,
}

impl BuildCredentialsExporter {
    /// Create an exporter building holders through `factory`.
    #[must_use]
    pub const fn new(factory: CredentialsFactory) -> Self {
        Self { factory }
    }

    /// Resolve credentials for `record` and prepare them for a build.
    ///
    /// `session_duration` overrides the connection's own session lifetime.
    ///
    /// # Errors
    ///
    /// Returns the failure to build a holder for the connection.
    pub async fn expose(
        &self,
        record: &ConnectionRecord,
        session_duration: Option<Duration>,
    ) -> Result<ExposedCredentials, CredentialsError> {
        if session_duration.is_none() {
            debug!(
                connection_id = %record.id,
                "No session duration requested, using the connection default"
            );
        }

        let holder = self.factory.build_for(record, session_duration).await?;
        let credentials = holder.credentials();
        let expires_at = holder.session_expiration();

        let mut profile = BTreeMap::new();
        profile.insert("aws_access_key_id", credentials.access_key_id().to_string());
        profile.insert(
            "aws_secret_access_key",
            credentials.secret_access_key().expose_secret().to_string(),
        );

        let mut environment = BTreeMap::new();
        environment.insert(
            ACCESS_KEY_ID_ENV.to_string(),
            credentials.access_key_id().to_string(),
        );
        environment.insert(
            SECRET_ACCESS_KEY_ENV.to_string(),
            credentials.secret_access_key().expose_secret().to_string(),
        );
        let mut password_parameters = vec![SECRET_ACCESS_KEY_ENV.to_string()];

        match credentials.session_token() {
            Some(token) => {
                profile.insert("aws_session_token", token.expose_secret().to_string());
                environment.insert(
                    SESSION_TOKEN_ENV.to_string(),
                    token.expose_secret().to_string(),
                );
                password_parameters.push(SESSION_TOKEN_ENV.to_string());
            }
            None if expires_at.is_some() => {
                warn!(
                    connection_id = %record.id,
                    access_key = %mask_key(credentials.access_key_id()),
                    "Session credentials were requested but no session token was issued"
                );
            }
            None => {}
        }

        if let Some(region) = record.parameter(REGION_NAME_PARAM) {
            environment.insert(DEFAULT_REGION_ENV.to_string(), region.to_string());
        }

        Ok(ExposedCredentials {
            environment,
            password_parameters,
            encoded_profile: encode_profile(&profile),
            expires_at,
        })
    }
}

fn encode_profile(entries: &BTreeMap<&str, String>) -> String {
    let mut document = Zeroizing::new(String::from(PROFILE_HEADER));
    for (key, value) in entries {
        document.push('\n');
        document.push_str(key);
        document.push('=');
        document.push_str(value);
    }
    STANDARD.encode(document.as_bytes())
}
