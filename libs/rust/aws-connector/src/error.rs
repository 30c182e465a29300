//! Connector error types using thiserror 2.0.
//!
//! Provider failures, credential construction failures, connection store
//! failures and the terminal key-rotation error. Refresh failures are values,
//! not errors: they are recorded on the holder and never raised.

use crate::config::ConfigError;
use crate::params::InvalidProperty;
use crate::rotation::{RotationLeftover, RotationStep};
use chrono::{DateTime, Utc};
use rust_common::RetryTimeout;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the provider's token, identity and key services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The referenced user or key does not exist
    #[error("No such entity: {0}")]
    NoSuchEntity(String),

    /// An account or user quota was hit (e.g. two access keys already exist)
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// The provider failed to process the request
    #[error("Service failure: {0}")]
    ServiceFailure(String),

    /// The presented credentials were rejected
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The request was throttled
    #[error("Throttled: {0}")]
    Throttled(String),

    /// The provider could not be reached
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Check if error is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Unavailable(_))
    }

    /// Create a throttling error.
    #[must_use]
    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }

    /// Create a no-such-entity error.
    #[must_use]
    pub fn no_such_entity(msg: impl Into<String>) -> Self {
        Self::NoSuchEntity(msg.into())
    }

    /// Create a limit-exceeded error.
    #[must_use]
    pub fn limit_exceeded(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    /// Create a service failure error.
    #[must_use]
    pub fn service_failure(msg: impl Into<String>) -> Self {
        Self::ServiceFailure(msg.into())
    }

    /// Create an invalid credentials error.
    #[must_use]
    pub fn invalid_credentials(msg: impl Into<String>) -> Self {
        Self::InvalidCredentials(msg.into())
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// A credentials holder could not be constructed.
#[derive(Error, Debug)]
pub enum CredentialsError {
    /// No usable credentials were found by the ambient resolution chain
    #[error("Failed to resolve credentials: {0}")]
    Resolution(String),

    /// The initial token exchange failed
    #[error("Failed to obtain session credentials: {0}")]
    SessionExchange(#[source] ProviderError),

    /// Requested session duration is outside the provider's limits
    #[error("Invalid session duration {requested:?}: must be between {min:?} and {max:?}")]
    InvalidSessionDuration {
        /// Requested duration
        requested: Duration,
        /// Shortest allowed duration
        min: Duration,
        /// Longest allowed duration
        max: Duration,
    },

    /// Connection parameters failed validation
    #[error("Invalid connection properties: {}", join_invalid(.0))]
    InvalidProperties(Vec<InvalidProperty>),

    /// The connection names a credentials type this connector cannot build
    #[error("Unsupported credentials type: {0}")]
    UnsupportedCredentialsType(String),
}

fn join_invalid(properties: &[InvalidProperty]) -> String {
    properties
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures of the external connection store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached
    #[error("Connection store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the update
    #[error("Connection update rejected: {0}")]
    Rejected(String),

    /// A stored record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A refresh that failed and was swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("refresh failed at {at}: {message}")]
pub struct RefreshFailure {
    /// When the refresh failed
    pub at: DateTime<Utc>,
    /// Why it failed
    pub message: String,
}

impl RefreshFailure {
    /// Record a failure that happened now.
    #[must_use]
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            message: message.into(),
        }
    }
}

/// Underlying reason a rotation step failed.
#[derive(Error, Debug)]
pub enum RotationCause {
    /// The provider rejected a key-management or identity call
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The new key never became usable within the budget
    #[error("Rotated key is invalid after {timeout:?}: {source}")]
    VerificationTimeout {
        /// Verification budget
        timeout: Duration,
        /// Last verification failure
        source: RetryTimeout<ProviderError>,
    },

    /// The store never reported the new key within the budget
    #[error("Rotated key was not persisted after {timeout:?}: {last_observation}")]
    PersistenceUnconfirmed {
        /// Confirmation budget
        timeout: Duration,
        /// What the last poll saw
        last_observation: String,
    },

    /// The connection disappeared mid-rotation
    #[error("The connection has been deleted while it was being rotated: {0}")]
    ConnectionVanished(String),

    /// The connection store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The connection record lacks an access key parameter
    #[error("Connection has no value for parameter {0}")]
    MissingParameter(&'static str),
}

/// Terminal failure of one rotation attempt.
///
/// Carries the step that failed and what was left changed, so an operator can
/// reconcile the connection and the provider by hand.
#[derive(Error, Debug)]
#[error("Rotation of connection {connection_id} failed at step {step}: {cause}. {leftover}")]
pub struct KeyRotationError {
    /// Connection being rotated
    pub connection_id: String,
    /// Step that failed
    pub step: RotationStep,
    /// State left behind
    pub leftover: RotationLeftover,
    /// Underlying cause
    #[source]
    pub cause: RotationCause,
}

impl KeyRotationError {
    /// Whether the connection record now points at the new key.
    #[must_use]
    pub const fn connection_switched(&self) -> bool {
        matches!(self.leftover, RotationLeftover::OldKeyNotDeleted { .. })
    }
}

/// Top-level connector error.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Credentials holder construction failed
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// Provider call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Connection store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Key rotation failed
    #[error(transparent)]
    Rotation(#[from] KeyRotationError),

    /// Configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
