//! Ambient credential resolution.
//!
//! Credentials found in the hosting process's surroundings rather than in a
//! connection: environment variables, instance metadata and so on. Links are
//! tried in order; the first one that resolves wins.

use crate::credentials::Credentials;
use crate::error::ProviderError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Environment variable holding the access key ID.
pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret access key.
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding the session token.
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// One source of ambient credentials.
#[async_trait]
pub trait AmbientCredentialsChain: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Resolve credentials from this source.
    async fn resolve(&self) -> Result<Credentials, ProviderError>;
}

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the
/// optional `AWS_SESSION_TOKEN`.
pub struct EnvironmentCredentials {
    lookup: Box<Lookup>,
}

impl EnvironmentCredentials {
    /// Read the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read variables through `lookup`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }
}

impl Default for EnvironmentCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvironmentCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentCredentials").finish_non_exhaustive()
    }
}

#[async_trait]
impl AmbientCredentialsChain for EnvironmentCredentials {
    fn name(&self) -> &str {
        "environment"
    }

    async fn resolve(&self) -> Result<Credentials, ProviderError> {
        let access_key_id = self
            .var(ACCESS_KEY_ID_VAR)
            .ok_or_else(|| ProviderError::no_such_entity(format!("{ACCESS_KEY_ID_VAR} is not set")))?;
        let secret_access_key = self.var(SECRET_ACCESS_KEY_VAR).ok_or_else(|| {
            ProviderError::no_such_entity(format!("{SECRET_ACCESS_KEY_VAR} is not set"))
        })?;

        let credentials = Credentials::new(access_key_id, secret_access_key);
        Ok(match self.var(SESSION_TOKEN_VAR) {
            Some(token) => credentials.with_session_token(token),
            None => credentials,
        })
    }
}

/// Tries each link in order and returns the first credentials found.
#[derive(Clone, Default)]
pub struct ChainedCredentials {
    links: Vec<Arc<dyn AmbientCredentialsChain>>,
}

impl ChainedCredentials {
    /// An empty chain, which never resolves.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a link.
    #[must_use]
    pub fn with_link(mut self, link: Arc<dyn AmbientCredentialsChain>) -> Self {
        self.links.push(link);
        self
    }

    /// Number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain has no links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl fmt::Debug for ChainedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.links.iter().map(|link| link.name()))
            .finish()
    }
}

#[async_trait]
impl AmbientCredentialsChain for ChainedCredentials {
    fn name(&self) -> &str {
        "chain"
    }

    async fn resolve(&self) -> Result<Credentials, ProviderError> {
        let mut failures = Vec::with_capacity(self.links.len());
        for link in &self.links {
            match link.resolve().await {
                Ok(credentials) => {
                    debug!(source = link.name(), "Resolved ambient credentials");
                    return Ok(credentials);
                }
                Err(e) => failures.push(format!("{}: {e}", link.name())),
            }
        }

        if failures.is_empty() {
            return Err(ProviderError::no_such_entity("no credential sources configured"));
        }
        Err(ProviderError::no_such_entity(failures.join("; ")))
    }
}
