//! Provider collaborator traits
//!
//! The connector never talks to the provider directly. Token exchange,
//! identity verification and access-key management are reached through these
//! traits so they can be backed by a real SDK client or a simulation.

pub mod ambient;

pub use ambient::{AmbientCredentialsChain, ChainedCredentials, EnvironmentCredentials};

use crate::credentials::{Credentials, CredentialsSnapshot};
use crate::error::ProviderError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;

/// Who a set of credentials authenticates as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Account ID
    pub account: String,
    /// Caller ARN
    pub arn: String,
    /// Unique user ID
    pub user_id: String,
}

/// A freshly created access key.
#[derive(Clone)]
pub struct AccessKey {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key, only ever returned at creation
    pub secret_access_key: SecretString,
}

impl AccessKey {
    /// Turn the key into long-lived credentials.
    #[must_use]
    pub fn into_credentials(self) -> Credentials {
        Credentials::new(self.access_key_id, self.secret_access_key.expose_secret())
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKey")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Exchanges long-lived credentials for session credentials.
#[async_trait]
pub trait TokenExchangeService: Send + Sync {
    /// Obtain session credentials lasting `duration`.
    async fn get_session_token(
        &self,
        credentials: &Credentials,
        duration: Duration,
    ) -> Result<CredentialsSnapshot, ProviderError>;
}

/// Confirms that credentials are accepted by the provider.
#[async_trait]
pub trait IdentityVerificationService: Send + Sync {
    /// Identify the caller behind `credentials`.
    async fn get_caller_identity(
        &self,
        credentials: &Credentials,
    ) -> Result<CallerIdentity, ProviderError>;
}

/// Manages the access keys of IAM users.
#[async_trait]
pub trait IdentityManagementService: Send + Sync {
    /// Name of the user owning `credentials`.
    async fn get_user_name(&self, credentials: &Credentials) -> Result<String, ProviderError>;

    /// Create a new access key for `user_name`, authenticating with `credentials`.
    async fn create_access_key(
        &self,
        credentials: &Credentials,
        user_name: &str,
    ) -> Result<AccessKey, ProviderError>;

    /// Delete `access_key_id` of `user_name`, authenticating with `credentials`.
    async fn delete_access_key(
        &self,
        credentials: &Credentials,
        user_name: &str,
        access_key_id: &str,
    ) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_key_into_credentials() {
        let key = AccessKey {
            access_key_id: "AKIANEW".to_string(),
            secret_access_key: SecretString::from("new-secret".to_string()),
        };

        let credentials = key.into_credentials();
        assert_eq!(credentials.access_key_id(), "AKIANEW");
        assert_eq!(credentials.secret_access_key().expose_secret(), "new-secret");
        assert!(!credentials.is_temporary());
    }

    #[test]
    fn test_access_key_debug_redacts_secret() {
        let key = AccessKey {
            access_key_id: "AKIANEW".to_string(),
            secret_access_key: SecretString::from("new-secret".to_string()),
        };
        assert!(!format!("{key:?}").contains("new-secret"));
    }
}
