//! Connection records and the store that persists them.

use crate::credentials::Credentials;
use crate::error::StoreError;
use crate::params::{ACCESS_KEY_ID_PARAM, SECRET_ACCESS_KEY_PARAM, SECURE_PARAM_PREFIX};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A persisted connection: an identifier plus its parameter map.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Connection identifier, unique within its project
    pub id: String,
    /// Connection parameters
    pub parameters: HashMap<String, String>,
}

impl ConnectionRecord {
    /// Create a record.
    #[must_use]
    pub fn new(id: impl Into<String>, parameters: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            parameters,
        }
    }

    /// Value of `key`, if present and non-empty.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Access key ID stored in the record.
    #[must_use]
    pub fn access_key_id(&self) -> Option<&str> {
        self.parameter(ACCESS_KEY_ID_PARAM)
    }

    /// The static access key pair stored in the record.
    ///
    /// # Errors
    ///
    /// Returns the key of the first missing parameter.
    pub fn access_keys(&self) -> Result<Credentials, &'static str> {
        let access_key_id = self.access_key_id().ok_or(ACCESS_KEY_ID_PARAM)?;
        let secret = self
            .parameter(SECRET_ACCESS_KEY_PARAM)
            .ok_or(SECRET_ACCESS_KEY_PARAM)?;
        Ok(Credentials::new(access_key_id, secret))
    }

    /// Parameters with the access key pair replaced by `credentials`.
    #[must_use]
    pub fn parameters_with_access_keys(&self, credentials: &Credentials) -> HashMap<String, String> {
        let mut parameters = self.parameters.clone();
        parameters.insert(
            ACCESS_KEY_ID_PARAM.to_string(),
            credentials.access_key_id().to_string(),
        );
        parameters.insert(
            SECRET_ACCESS_KEY_PARAM.to_string(),
            credentials.secret_access_key().expose_secret().to_string(),
        );
        parameters
    }

    /// Serialize for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if `json` is not a record.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

struct RedactedParameters<'a>(&'a HashMap<String, String>);

impl fmt::Debug for RedactedParameters<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort();

        f.debug_map()
            .entries(entries.into_iter().map(|(key, value)| {
                if key.starts_with(SECURE_PARAM_PREFIX) {
                    (key.as_str(), "[REDACTED]")
                } else {
                    (key.as_str(), value.as_str())
                }
            }))
            .finish()
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("parameters", &RedactedParameters(&self.parameters))
            .finish()
    }
}

/// Persists connection records.
///
/// `update` may be buffered; a write counts as persisted only once
/// [`ConnectionStore::read_persisted`] returns it.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Look up a connection in `project`.
    async fn find(&self, project: &str, connection_id: &str) -> Result<Option<ConnectionRecord>, StoreError>;

    /// Replace the parameters of a connection.
    async fn update(
        &self,
        project: &str,
        connection_id: &str,
        parameters: HashMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Ask the store to flush `project` to durable storage.
    fn schedule_persist(&self, project: &str, reason: &str);

    /// Read what has actually been persisted.
    async fn read_persisted(
        &self,
        project: &str,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, StoreError> {
        self.find(project, connection_id).await
    }
}
