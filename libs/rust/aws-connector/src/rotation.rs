//! Access key rotation for static connections.
//!
//! Rotation is a linear protocol: locate the connection, capture its key,
//! resolve the owning user, create a new key, wait until the provider accepts
//! it, switch the connection over, wait until the switch is persisted, and
//! only then delete the old key. Every step is a commit point; nothing is
//! rolled back. A failure reports the step and what was left changed.

use crate::config::ConnectorConfig;
use crate::credentials::Credentials;
use crate::error::{KeyRotationError, RotationCause};
use crate::params::mask_key;
use crate::provider::{IdentityManagementService, IdentityVerificationService};
use crate::store::ConnectionStore;
use chrono::{DateTime, Utc};
use rust_common::metrics::{Metric, render};
use rust_common::{BoundedPoll, Counter, DelayListener, PollError, Probe, Retrier, TracingListener};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Protocol states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RotationStep {
    /// Nothing done yet
    Idle,
    /// Connection record found
    Located,
    /// Current key read from the record
    OldKeyCaptured,
    /// Owning user resolved
    UserResolved,
    /// New key exists at the provider
    NewKeyCreated,
    /// Provider accepts the new key
    NewKeyVerified,
    /// Record switched to the new key
    RecordUpdated,
    /// Switch observed in persisted state
    RecordConfirmed,
    /// Old key deleted; rotation complete
    OldKeyDeleted,
}

impl RotationStep {
    /// The state following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::Located,
            Self::Located => Self::OldKeyCaptured,
            Self::OldKeyCaptured => Self::UserResolved,
            Self::UserResolved => Self::NewKeyCreated,
            Self::NewKeyCreated => Self::NewKeyVerified,
            Self::NewKeyVerified => Self::RecordUpdated,
            Self::RecordUpdated => Self::RecordConfirmed,
            Self::RecordConfirmed | Self::OldKeyDeleted => Self::OldKeyDeleted,
        }
    }

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Located => "located",
            Self::OldKeyCaptured => "old_key_captured",
            Self::UserResolved => "user_resolved",
            Self::NewKeyCreated => "new_key_created",
            Self::NewKeyVerified => "new_key_verified",
            Self::RecordUpdated => "record_updated",
            Self::RecordConfirmed => "record_confirmed",
            Self::OldKeyDeleted => "old_key_deleted",
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failed rotation left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationLeftover {
    /// Neither the record nor the provider keys changed
    Unchanged,
    /// The record still uses the old key; a new key exists at the provider
    OrphanedNewKey {
        /// Key that may need manual deletion
        new_access_key_id: String,
    },
    /// The record was updated but the update was never observed as persisted
    RecordUnconfirmed {
        /// Key written to the record
        new_access_key_id: String,
        /// Key that was kept at the provider
        old_access_key_id: String,
    },
    /// The record uses the new key; the old key is still active
    OldKeyNotDeleted {
        /// Key that should be deleted
        old_access_key_id: String,
    },
}

impl fmt::Display for RotationLeftover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => f.write_str("The connection and its access keys are unchanged"),
            Self::OrphanedNewKey { new_access_key_id } => write!(
                f,
                "The connection still uses its previous key; new access key {new_access_key_id} exists and may need to be deleted manually"
            ),
            Self::RecordUnconfirmed {
                new_access_key_id,
                old_access_key_id,
            } => write!(
                f,
                "The connection was switched to access key {new_access_key_id} but the change was not confirmed as saved; previous key {old_access_key_id} was kept, check the stored connection before deleting either key"
            ),
            Self::OldKeyNotDeleted { old_access_key_id } => write!(
                f,
                "The connection uses the new key; previous access key {old_access_key_id} is still active and should be deleted"
            ),
        }
    }
}

/// In-memory state of one rotation run. Never persisted.
#[derive(Debug, Clone)]
pub struct RotationAttempt {
    /// Identifies this run in logs
    pub id: Uuid,
    /// Connection being rotated
    pub connection_id: String,
    /// Last completed state
    pub state: RotationStep,
    /// Key read from the record
    pub previous_credentials: Option<Credentials>,
    /// Key created at the provider
    pub new_credentials: Option<Credentials>,
    /// User owning both keys
    pub iam_user_name: Option<String>,
    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl RotationAttempt {
    /// Start a run in [`RotationStep::Idle`].
    #[must_use]
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id: connection_id.into(),
            state: RotationStep::Idle,
            previous_credentials: None,
            new_credentials: None,
            iam_user_name: None,
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, step: RotationStep) {
        debug_assert_eq!(step, self.state.next());
        self.state = step;
        debug!(step = %step, "Rotation step completed");
    }

    /// What is left changed if the run stopped now.
    #[must_use]
    pub fn leftover(&self) -> RotationLeftover {
        let key_id = |credentials: &Option<Credentials>| {
            credentials
                .as_ref()
                .map(|c| c.access_key_id().to_string())
                .unwrap_or_default()
        };

        match self.state {
            RotationStep::Idle
            | RotationStep::Located
            | RotationStep::OldKeyCaptured
            | RotationStep::UserResolved => RotationLeftover::Unchanged,
            RotationStep::NewKeyCreated | RotationStep::NewKeyVerified => {
                RotationLeftover::OrphanedNewKey {
                    new_access_key_id: key_id(&self.new_credentials),
                }
            }
            RotationStep::RecordUpdated => RotationLeftover::RecordUnconfirmed {
                new_access_key_id: key_id(&self.new_credentials),
                old_access_key_id: key_id(&self.previous_credentials),
            },
            RotationStep::RecordConfirmed | RotationStep::OldKeyDeleted => {
                RotationLeftover::OldKeyNotDeleted {
                    old_access_key_id: key_id(&self.previous_credentials),
                }
            }
        }
    }

    /// The error for a failure of the step after the current state.
    #[must_use]
    pub fn fail(&self, cause: RotationCause) -> KeyRotationError {
        KeyRotationError {
            connection_id: self.connection_id.clone(),
            step: self.state.next(),
            leftover: self.leftover(),
            cause,
        }
    }
}

/// Rotation counters.
#[derive(Debug)]
pub struct RotationMetrics {
    /// Rotations started
    pub started: Counter,
    /// Rotations completed
    pub succeeded: Counter,
    /// Rotations that failed
    pub failed: Counter,
}

impl Default for RotationMetrics {
    fn default() -> Self {
        Self {
            started: Counter::new("aws_key_rotations_total", "Access key rotations started"),
            succeeded: Counter::new(
                "aws_key_rotations_succeeded_total",
                "Access key rotations completed",
            ),
            failed: Counter::new("aws_key_rotations_failed_total", "Access key rotations failed"),
        }
    }
}

impl RotationMetrics {
    /// Render as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        render(&[&self.started as &dyn Metric, &self.succeeded, &self.failed])
    }
}

/// Rotates the access key of static connections.
///
/// Rotations of the same connection must be serialized by the caller: the
/// record re-fetch and write are not transactional.
pub struct KeyRotator {
    store: Arc<dyn ConnectionStore>,
    iam: Arc<dyn IdentityManagementService>,
    verifier: Arc<dyn IdentityVerificationService>,
    timeout: Duration,
    verification_delay: Duration,
    poll_interval: Duration,
    metrics: RotationMetrics,
}

impl fmt::Debug for KeyRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRotator")
            .field("timeout", &self.timeout)
            .field("verification_delay", &self.verification_delay)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl KeyRotator {
    /// Create a rotator.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        iam: Arc<dyn IdentityManagementService>,
        verifier: Arc<dyn IdentityVerificationService>,
        config: &ConnectorConfig,
    ) -> Self {
        Self {
            store,
            iam,
            verifier,
            timeout: config.rotate_timeout,
            verification_delay: config.verification_delay,
            poll_interval: config.persist_poll_interval,
            metrics: RotationMetrics::default(),
        }
    }

    /// Rotation counters.
    #[must_use]
    pub const fn metrics(&self) -> &RotationMetrics {
        &self.metrics
    }

    /// Replace the access key of `connection_id` in `project`.
    ///
    /// A connection that does not exist is treated as already rotated away.
    /// Waits up to the rotation budget twice: once for the new key to become
    /// usable and once for the updated record to be persisted.
    ///
    /// # Errors
    ///
    /// Returns [`KeyRotationError`] naming the failed step and what was left
    /// changed.
    #[instrument(skip(self), fields(attempt_id = tracing::field::Empty))]
    pub async fn rotate_connection_keys(
        &self,
        connection_id: &str,
        project: &str,
    ) -> Result<(), KeyRotationError> {
        let mut attempt = RotationAttempt::new(connection_id);
        tracing::Span::current().record("attempt_id", tracing::field::display(attempt.id));
        self.metrics.started.inc();

        let result = self.run(&mut attempt, project).await;

        let elapsed_ms = (Utc::now() - attempt.started_at).num_milliseconds();
        match &result {
            Ok(()) => {
                self.metrics.succeeded.inc();
                info!(elapsed_ms, step = %attempt.state, "Rotation finished");
            }
            Err(e) => {
                self.metrics.failed.inc();
                error!(elapsed_ms, step = %e.step, error = %e, "Rotation failed");
            }
        }
        result
    }

    async fn run(&self, attempt: &mut RotationAttempt, project: &str) -> Result<(), KeyRotationError> {
        let connection_id = attempt.connection_id.clone();

        let Some(record) = self
            .store
            .find(project, &connection_id)
            .await
            .map_err(|e| attempt.fail(e.into()))?
        else {
            info!("Connection not found, nothing to rotate");
            return Ok(());
        };
        attempt.advance(RotationStep::Located);

        let previous = record
            .access_keys()
            .map_err(|missing| attempt.fail(RotationCause::MissingParameter(missing)))?;
        attempt.previous_credentials = Some(previous.clone());
        attempt.advance(RotationStep::OldKeyCaptured);

        let user_name = self
            .iam
            .get_user_name(&previous)
            .await
            .map_err(|e| attempt.fail(e.into()))?;
        attempt.iam_user_name = Some(user_name.clone());
        attempt.advance(RotationStep::UserResolved);

        let new = self
            .iam
            .create_access_key(&previous, &user_name)
            .await
            .map_err(|e| attempt.fail(e.into()))?
            .into_credentials();
        info!(
            old_key = %mask_key(previous.access_key_id()),
            new_key = %mask_key(new.access_key_id()),
            "Created new access key"
        );
        attempt.new_credentials = Some(new.clone());
        attempt.advance(RotationStep::NewKeyCreated);

        self.verify_new_key(&new)
            .await
            .map_err(|cause| attempt.fail(cause))?;
        attempt.advance(RotationStep::NewKeyVerified);

        let current = match self.store.find(project, &connection_id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                return Err(attempt.fail(RotationCause::ConnectionVanished(connection_id)));
            }
            Err(e) => return Err(attempt.fail(e.into())),
        };
        self.store
            .update(project, &current.id, current.parameters_with_access_keys(&new))
            .await
            .map_err(|e| attempt.fail(e.into()))?;
        self.store.schedule_persist(project, "AWS connection access key rotated");
        attempt.advance(RotationStep::RecordUpdated);

        self.confirm_persisted(project, &current.id, new.access_key_id())
            .await
            .map_err(|cause| attempt.fail(cause))?;
        attempt.advance(RotationStep::RecordConfirmed);

        self.iam
            .delete_access_key(&new, &user_name, previous.access_key_id())
            .await
            .map_err(|e| attempt.fail(e.into()))?;
        attempt.advance(RotationStep::OldKeyDeleted);

        Ok(())
    }

    async fn verify_new_key(&self, new: &Credentials) -> Result<(), RotationCause> {
        let verifier = self.verifier.as_ref();
        let retrier = Retrier::new(self.timeout)
            .register_listener(DelayListener::new(self.verification_delay))
            .register_listener(TracingListener::new("verify rotated access key"));

        let identity = retrier
            .execute(move || verifier.get_caller_identity(new))
            .await
            .map_err(|source| RotationCause::VerificationTimeout {
                timeout: self.timeout,
                source,
            })?;

        debug!(arn = %identity.arn, "Rotated access key is usable");
        Ok(())
    }

    async fn confirm_persisted(
        &self,
        project: &str,
        connection_id: &str,
        new_access_key_id: &str,
    ) -> Result<(), RotationCause> {
        let store = self.store.as_ref();
        let poll = BoundedPoll::new(self.poll_interval, self.timeout);

        poll.until(|| async move {
            match store.read_persisted(project, connection_id).await {
                Ok(Some(record)) if record.access_key_id() == Some(new_access_key_id) => {
                    Ok(Probe::Ready(()))
                }
                Ok(Some(record)) => Ok(Probe::pending(format!(
                    "The rotated key has not been updated in project {project}, connection {connection_id}: stored key is {}",
                    record.access_key_id().map_or_else(|| "<none>".to_string(), mask_key)
                ))),
                Ok(None) => Err(RotationCause::ConnectionVanished(connection_id.to_string())),
                Err(e) => Ok(Probe::pending(format!("Failed to read the stored connection: {e}"))),
            }
        })
        .await
        .map_err(|e| match e {
            PollError::TimedOut {
                last_observation, ..
            } => RotationCause::PersistenceUnconfirmed {
                timeout: self.timeout,
                last_observation,
            },
            PollError::Aborted(cause) => cause,
        })
    }
}
