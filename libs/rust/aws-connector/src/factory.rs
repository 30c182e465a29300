//! Builds the right credentials holder for a connection.

use crate::config::ConnectorConfig;
use crate::error::CredentialsError;
use crate::holder::{CredentialsHolder, DefaultChainCredentialsHolder, StaticCredentialsHolder};
use crate::params::{
    self, CREDENTIALS_TYPE_PARAM, DEFAULT_PROVIDER_CREDENTIALS_TYPE, InvalidProperty,
    STATIC_CREDENTIALS_TYPE, mask_key,
};
use crate::provider::{AmbientCredentialsChain, TokenExchangeService};
use crate::refresher::CredentialsRefresher;
use crate::store::ConnectionRecord;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How a connection obtains credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsType {
    /// Static access keys stored in the connection
    AccessKeys,
    /// Whatever the hosting process's environment provides
    DefaultProvider,
}

impl CredentialsType {
    /// Parameter value naming this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessKeys => STATIC_CREDENTIALS_TYPE,
            Self::DefaultProvider => DEFAULT_PROVIDER_CREDENTIALS_TYPE,
        }
    }

    /// Type named by `params`; static keys when absent.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::UnsupportedCredentialsType`] for unknown values.
    pub fn of(params: &HashMap<String, String>) -> Result<Self, CredentialsError> {
        params
            .get(CREDENTIALS_TYPE_PARAM)
            .map_or(Ok(Self::AccessKeys), |value| value.parse())
    }
}

impl FromStr for CredentialsType {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATIC_CREDENTIALS_TYPE => Ok(Self::AccessKeys),
            DEFAULT_PROVIDER_CREDENTIALS_TYPE => Ok(Self::DefaultProvider),
            other => Err(CredentialsError::UnsupportedCredentialsType(other.to_string())),
        }
    }
}

impl fmt::Display for CredentialsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creates credentials holders from connection parameters.
#[derive(Clone)]
pub struct CredentialsFactory {
    sts: Arc<dyn TokenExchangeService>,
    ambient: Arc<dyn AmbientCredentialsChain>,
    config: ConnectorConfig,
}

impl fmt::Debug for CredentialsFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsFactory")
            .field("ambient", &self.ambient.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CredentialsFactory {
    /// Create a factory.
    #[must_use]
    pub fn new(
        sts: Arc<dyn TokenExchangeService>,
        ambient: Arc<dyn AmbientCredentialsChain>,
        config: ConnectorConfig,
    ) -> Self {
        Self {
            sts,
            ambient,
            config,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Validate `params` for their credentials type.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::UnsupportedCredentialsType`] for unknown types.
    pub fn invalid_properties(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Vec<InvalidProperty>, CredentialsError> {
        Ok(match CredentialsType::of(params)? {
            CredentialsType::AccessKeys => params::validate_static_properties(params, &self.config),
            CredentialsType::DefaultProvider => Vec::new(),
        })
    }

    /// Build a holder for `params`.
    ///
    /// Static keys with session credentials enabled get a background
    /// [`CredentialsRefresher`], which stops when the returned holder is
    /// dropped. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`CredentialsError::InvalidProperties`] if validation fails, otherwise
    /// whatever constructing the holder fails with.
    pub async fn build_holder(
        &self,
        params: &HashMap<String, String>,
        session_duration: Option<Duration>,
    ) -> Result<Arc<dyn CredentialsHolder>, CredentialsError> {
        let invalid = self.invalid_properties(params)?;
        if !invalid.is_empty() {
            return Err(CredentialsError::InvalidProperties(invalid));
        }

        match CredentialsType::of(params)? {
            CredentialsType::DefaultProvider => {
                let holder = DefaultChainCredentialsHolder::resolve(self.ambient.as_ref()).await?;
                Ok(Arc::new(holder))
            }
            CredentialsType::AccessKeys => {
                let record = ConnectionRecord::new(String::new(), params.clone());
                let credentials = record
                    .access_keys()
                    .map_err(|missing| {
                        CredentialsError::InvalidProperties(vec![InvalidProperty::new(
                            missing,
                            "Parameter is required",
                        )])
                    })?;
                let base: Arc<dyn CredentialsHolder> =
                    Arc::new(StaticCredentialsHolder::new(credentials.clone()));

                if !params::use_session_credentials(params) {
                    return Ok(base);
                }

                let duration = params::session_duration(params, session_duration, &self.config);
                debug!(
                    access_key = %mask_key(credentials.access_key_id()),
                    duration_secs = duration.as_secs(),
                    "Using session credentials"
                );
                let refresher =
                    CredentialsRefresher::build(base, self.sts.clone(), duration, &self.config).await?;
                Ok(Arc::new(refresher))
            }
        }
    }

    /// Build a holder for a stored connection.
    ///
    /// # Errors
    ///
    /// See [`CredentialsFactory::build_holder`].
    pub async fn build_for(
        &self,
        record: &ConnectionRecord,
        session_duration: Option<Duration>,
    ) -> Result<Arc<dyn CredentialsHolder>, CredentialsError> {
        self.build_holder(&record.parameters, session_duration).await
    }
}
