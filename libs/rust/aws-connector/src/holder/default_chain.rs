use super::CredentialsHolder;
use crate::credentials::Credentials;
use crate::error::CredentialsError;
use crate::params::mask_key;
use crate::provider::AmbientCredentialsChain;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Credentials resolved once from the ambient chain.
///
/// Refreshing is a no-op; the resolved credentials are kept for the life of
/// the holder.
#[derive(Debug, Clone)]
pub struct DefaultChainCredentialsHolder {
    credentials: Credentials,
}

impl DefaultChainCredentialsHolder {
    /// Resolve credentials from `chain`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Resolution`] if no link of the chain
    /// produced credentials.
    pub async fn resolve(chain: &dyn AmbientCredentialsChain) -> Result<Self, CredentialsError> {
        let credentials = chain
            .resolve()
            .await
            .map_err(|e| CredentialsError::Resolution(e.to_string()))?;

        debug!(
            source = chain.name(),
            access_key = %mask_key(credentials.access_key_id()),
            "Using ambient credentials"
        );
        Ok(Self { credentials })
    }
}

#[async_trait]
impl CredentialsHolder for DefaultChainCredentialsHolder {
    fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    async fn refresh(&self) {}

    fn session_expiration(&self) -> Option<DateTime<Utc>> {
        None
    }
}
