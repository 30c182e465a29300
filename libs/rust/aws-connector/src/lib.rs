//! AWS credential lifecycle engine for the Auth Platform
//!
//! Holds static, ambient and session credentials behind one capability
//! interface, keeps session credentials fresh in the background, and rotates
//! the long-lived access key backing a persisted connection without ever
//! leaving the connection without a working key.

pub mod build_context;
pub mod config;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod holder;
pub mod params;
pub mod provider;
pub mod refresher;
pub mod rotation;
pub mod store;
pub mod tester;

pub use build_context::{BuildCredentialsExporter, ExposedCredentials};
pub use config::{ConfigError, ConnectorConfig};
pub use credentials::{Credentials, CredentialsSnapshot};
pub use error::{
    ConnectorError, ConnectorResult, CredentialsError, KeyRotationError, ProviderError,
    RefreshFailure, RotationCause, StoreError,
};
pub use factory::{CredentialsFactory, CredentialsType};
pub use holder::{
    CredentialsHolder, DefaultChainCredentialsHolder, SessionCredentialsHolder,
    StaticCredentialsHolder,
};
pub use provider::{
    AccessKey, AmbientCredentialsChain, CallerIdentity, IdentityManagementService,
    IdentityVerificationService, TokenExchangeService,
};
pub use refresher::{CredentialsRefresher, RefreshMetrics};
pub use rotation::{KeyRotator, RotationAttempt, RotationLeftover, RotationMetrics, RotationStep};
pub use store::{ConnectionRecord, ConnectionStore};
pub use tester::ConnectionTester;
