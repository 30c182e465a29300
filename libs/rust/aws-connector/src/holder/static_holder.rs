use super::CredentialsHolder;
use crate::credentials::Credentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Fixed long-lived credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentialsHolder {
    credentials: Credentials,
}

impl StaticCredentialsHolder {
    /// Hold `credentials` as-is.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialsHolder for StaticCredentialsHolder {
    fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    async fn refresh(&self) {}

    fn session_expiration(&self) -> Option<DateTime<Utc>> {
        None
    }
}
