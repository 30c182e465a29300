//! Connection testing.

use crate::error::{ConnectorResult, ProviderError};
use crate::factory::CredentialsFactory;
use crate::holder::CredentialsHolder;
use crate::params::mask_key;
use crate::provider::{CallerIdentity, IdentityVerificationService};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Checks that a connection's credentials are accepted by the provider.
#[derive(Clone)]
pub struct ConnectionTester {
    verifier: Arc<dyn IdentityVerificationService>,
}

impl std::fmt::Debug for ConnectionTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTester").finish_non_exhaustive()
    }
}

impl ConnectionTester {
    /// Create a tester.
    #[must_use]
    pub fn new(verifier: Arc<dyn IdentityVerificationService>) -> Self {
        Self { verifier }
    }

    /// Identify the caller behind the holder's current credentials.
    ///
    /// # Errors
    ///
    /// Returns the provider's rejection.
    #[instrument(skip_all)]
    pub async fn test_connection(
        &self,
        holder: &dyn CredentialsHolder,
    ) -> Result<CallerIdentity, ProviderError> {
        let credentials = holder.credentials();
        let identity = self.verifier.get_caller_identity(&credentials).await?;
        info!(
            access_key = %mask_key(credentials.access_key_id()),
            account = %identity.account,
            "Connection test succeeded"
        );
        Ok(identity)
    }

    /// Validate `params`, build a holder and test it.
    ///
    /// The holder is dropped afterwards, which stops any refresh it started.
    ///
    /// # Errors
    ///
    /// Returns the validation, construction or provider failure.
    #[instrument(skip_all)]
    pub async fn test_parameters(
        &self,
        factory: &CredentialsFactory,
        params: &HashMap<String, String>,
    ) -> ConnectorResult<CallerIdentity> {
        let holder = factory.build_holder(params, None).await?;
        Ok(self.test_connection(holder.as_ref()).await?)
    }
}
