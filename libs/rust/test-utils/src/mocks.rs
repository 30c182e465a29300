//! Mock implementations for testing.
//!
//! [`MockAwsProvider`] simulates one account's token, identity and key
//! services; [`InMemoryConnectionStore`] is a connection store whose
//! persisted view can lag behind its live view.

use async_trait::async_trait;
use aws_connector::{
    AccessKey, CallerIdentity, ConnectionRecord, ConnectionStore, Credentials, CredentialsSnapshot,
    IdentityManagementService, IdentityVerificationService, ProviderError, StoreError,
    TokenExchangeService,
};
use chrono::{TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Account ID reported by [`MockAwsProvider`].
pub const MOCK_ACCOUNT_ID: &str = "123456789012";

/// Access keys a user may hold at once.
pub const MAX_KEYS_PER_USER: usize = 2;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct KeyEntry {
    user_name: String,
    secret: String,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    user_name: String,
    secret: String,
    token: String,
}

#[derive(Debug, Default)]
struct ProviderState {
    keys: HashMap<String, KeyEntry>,
    sessions: HashMap<String, SessionEntry>,
    calls: Vec<String>,
    next_id: u64,
}

/// Simulated provider account.
///
/// Failure knobs make single calls misbehave; everything else follows the
/// provider's rules (two keys per user, secrets must match, sessions are
/// unique per exchange).
#[derive(Debug, Default)]
pub struct MockAwsProvider {
    state: Mutex<ProviderState>,
    failing_verifications: AtomicU32,
    never_verify: AtomicBool,
    create_error: Mutex<Option<ProviderError>>,
    delete_error: Mutex<Option<ProviderError>>,
    session_error: Mutex<Option<ProviderError>>,
}

impl MockAwsProvider {
    /// An account without users.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing access key for `user_name`.
    #[must_use]
    pub fn with_key(self, user_name: &str, access_key_id: &str, secret: &str) -> Self {
        lock(&self.state).keys.insert(
            access_key_id.to_string(),
            KeyEntry {
                user_name: user_name.to_string(),
                secret: secret.to_string(),
            },
        );
        self
    }

    /// Make the next `n` caller-identity checks fail, as while a new key propagates.
    pub fn fail_next_verifications(&self, n: u32) {
        self.failing_verifications.store(n, Ordering::SeqCst);
    }

    /// Make every caller-identity check fail.
    pub fn never_verify(&self) {
        self.never_verify.store(true, Ordering::SeqCst);
    }

    /// Make access key creation fail with `error`.
    pub fn fail_create_with(&self, error: ProviderError) {
        *lock(&self.create_error) = Some(error);
    }

    /// Make access key deletion fail with `error`.
    pub fn fail_delete_with(&self, error: ProviderError) {
        *lock(&self.delete_error) = Some(error);
    }

    /// Make token exchanges fail with `error`, or succeed again with `None`.
    pub fn fail_sessions_with(&self, error: Option<ProviderError>) {
        *lock(&self.session_error) = error;
    }

    /// Access key IDs currently active for `user_name`, sorted.
    #[must_use]
    pub fn active_keys(&self, user_name: &str) -> Vec<String> {
        let mut keys: Vec<_> = lock(&self.state)
            .keys
            .iter()
            .filter(|(_, entry)| entry.user_name == user_name)
            .map(|(id, _)| id.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Whether `access_key_id` is active.
    #[must_use]
    pub fn is_active(&self, access_key_id: &str) -> bool {
        lock(&self.state).keys.contains_key(access_key_id)
    }

    /// Every call made so far, by operation name.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls of `operation`.
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.as_str() == operation)
            .count()
    }

    fn record(&self, operation: &str) {
        lock(&self.state).calls.push(operation.to_string());
    }

    fn authenticate(&self, credentials: &Credentials) -> Result<String, ProviderError> {
        let state = lock(&self.state);
        let secret = credentials.secret_access_key().expose_secret();

        if let Some(token) = credentials.session_token() {
            return state
                .sessions
                .get(credentials.access_key_id())
                .filter(|s| s.secret == secret && s.token == token.expose_secret())
                .map(|s| s.user_name.clone())
                .ok_or_else(|| ProviderError::invalid_credentials("The security token included in the request is invalid"));
        }

        state
            .keys
            .get(credentials.access_key_id())
            .filter(|entry| entry.secret == secret)
            .map(|entry| entry.user_name.clone())
            .ok_or_else(|| {
                ProviderError::invalid_credentials(format!(
                    "The access key {} does not exist or its secret does not match",
                    credentials.access_key_id()
                ))
            })
    }

    fn next_id(&self) -> u64 {
        let mut state = lock(&self.state);
        state.next_id += 1;
        state.next_id
    }
}

#[async_trait]
impl TokenExchangeService for MockAwsProvider {
    async fn get_session_token(
        &self,
        credentials: &Credentials,
        duration: Duration,
    ) -> Result<CredentialsSnapshot, ProviderError> {
        self.record("get_session_token");
        if let Some(error) = lock(&self.session_error).clone() {
            return Err(error);
        }
        let user_name = self.authenticate(credentials)?;

        let n = self.next_id();
        let session = SessionEntry {
            user_name,
            secret: format!("session-secret-{n}"),
            token: format!("session-token-{n}"),
        };
        let access_key_id = format!("ASIA{n:016}");
        let issued = Credentials::new(access_key_id.clone(), session.secret.clone())
            .with_session_token(session.token.clone());
        lock(&self.state).sessions.insert(access_key_id, session);

        let lifetime = TimeDelta::from_std(duration)
            .map_err(|e| ProviderError::service_failure(e.to_string()))?;
        Ok(CredentialsSnapshot::expiring(issued, Utc::now() + lifetime))
    }
}

#[async_trait]
impl IdentityVerificationService for MockAwsProvider {
    async fn get_caller_identity(
        &self,
        credentials: &Credentials,
    ) -> Result<CallerIdentity, ProviderError> {
        self.record("get_caller_identity");
        if self.never_verify.load(Ordering::SeqCst) {
            return Err(ProviderError::invalid_credentials("The security token included in the request is invalid"));
        }
        if self
            .failing_verifications
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::invalid_credentials("The security token included in the request is invalid"));
        }

        let user_name = self.authenticate(credentials)?;
        Ok(CallerIdentity {
            account: MOCK_ACCOUNT_ID.to_string(),
            arn: format!("arn:aws:iam::{MOCK_ACCOUNT_ID}:user/{user_name}"),
            user_id: format!("AIDA{}", user_name.to_uppercase()),
        })
    }
}

#[async_trait]
impl IdentityManagementService for MockAwsProvider {
    async fn get_user_name(&self, credentials: &Credentials) -> Result<String, ProviderError> {
        self.record("get_user_name");
        self.authenticate(credentials)
    }

    async fn create_access_key(
        &self,
        credentials: &Credentials,
        user_name: &str,
    ) -> Result<AccessKey, ProviderError> {
        self.record("create_access_key");
        if let Some(error) = lock(&self.create_error).clone() {
            return Err(error);
        }
        self.authenticate(credentials)?;
        if self.active_keys(user_name).len() >= MAX_KEYS_PER_USER {
            return Err(ProviderError::limit_exceeded(format!(
                "Cannot exceed quota for AccessKeysPerUser: {MAX_KEYS_PER_USER}"
            )));
        }

        let n = self.next_id();
        let access_key_id = format!("AKIA{n:016}");
        let secret = format!("rotated-secret-{n}");
        lock(&self.state).keys.insert(
            access_key_id.clone(),
            KeyEntry {
                user_name: user_name.to_string(),
                secret: secret.clone(),
            },
        );

        Ok(AccessKey {
            access_key_id,
            secret_access_key: SecretString::from(secret),
        })
    }

    async fn delete_access_key(
        &self,
        credentials: &Credentials,
        user_name: &str,
        access_key_id: &str,
    ) -> Result<(), ProviderError> {
        self.record("delete_access_key");
        if let Some(error) = lock(&self.delete_error).clone() {
            return Err(error);
        }
        self.authenticate(credentials)?;

        let mut state = lock(&self.state);
        let owned = state
            .keys
            .get(access_key_id)
            .is_some_and(|entry| entry.user_name == user_name);
        if !owned {
            return Err(ProviderError::no_such_entity(format!(
                "The Access Key with id {access_key_id} cannot be found"
            )));
        }
        state.keys.remove(access_key_id);
        Ok(())
    }
}

type RecordKey = (String, String);

fn key(project: &str, connection_id: &str) -> RecordKey {
    (project.to_string(), connection_id.to_string())
}

/// Connection store with a separately persisted view.
///
/// By default a persist request copies the project's live records to the
/// persisted view immediately. The persisted view holds records in their JSON
/// form and decodes them on read.
#[derive(Debug, Default)]
pub struct InMemoryConnectionStore {
    live: Mutex<HashMap<RecordKey, ConnectionRecord>>,
    persisted: Mutex<HashMap<RecordKey, String>>,
    persist_requests: Mutex<Vec<String>>,
    never_persist: AtomicBool,
    persist_lag_reads: AtomicU32,
    pending_persist: Mutex<Option<String>>,
    failing_persisted_reads: AtomicU32,
    vanish_after_finds: Mutex<Option<u32>>,
    updates: AtomicU32,
}

impl InMemoryConnectionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, live and persisted.
    #[must_use]
    pub fn with_record(self, project: &str, record: ConnectionRecord) -> Self {
        if let Ok(json) = record.to_json() {
            lock(&self.persisted).insert(key(project, &record.id), json);
        }
        lock(&self.live).insert(key(project, &record.id), record);
        self
    }

    /// Ignore persist requests.
    pub fn never_persist(&self) {
        self.never_persist.store(true, Ordering::SeqCst);
    }

    /// Apply a persist request only after `reads` persisted reads.
    pub fn lag_persistence_by(&self, reads: u32) {
        self.persist_lag_reads.store(reads, Ordering::SeqCst);
    }

    /// Make the next `n` persisted reads fail.
    pub fn fail_next_persisted_reads(&self, n: u32) {
        self.failing_persisted_reads.store(n, Ordering::SeqCst);
    }

    /// Overwrite the persisted form of a record with something that is not a record.
    pub fn corrupt_persisted(&self, project: &str, connection_id: &str) {
        lock(&self.persisted).insert(key(project, connection_id), "{\"id\": 1}".to_string());
    }

    /// Delete every record after `finds` lookups.
    pub fn vanish_after_finds(&self, finds: u32) {
        *lock(&self.vanish_after_finds) = Some(finds);
    }

    /// Live view of a record.
    #[must_use]
    pub fn get(&self, project: &str, connection_id: &str) -> Option<ConnectionRecord> {
        lock(&self.live).get(&key(project, connection_id)).cloned()
    }

    /// Persisted view of a record; `None` when absent or undecodable.
    #[must_use]
    pub fn persisted(&self, project: &str, connection_id: &str) -> Option<ConnectionRecord> {
        self.decode_persisted(project, connection_id).ok().flatten()
    }

    fn decode_persisted(
        &self,
        project: &str,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, StoreError> {
        lock(&self.persisted)
            .get(&key(project, connection_id))
            .map(|json| ConnectionRecord::from_json(json))
            .transpose()
    }

    /// Number of updates applied.
    #[must_use]
    pub fn update_count(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }

    /// Reasons given for persist requests.
    #[must_use]
    pub fn persist_requests(&self) -> Vec<String> {
        lock(&self.persist_requests).clone()
    }

    fn persist(&self, project: &str) -> Result<(), StoreError> {
        let live = lock(&self.live);
        let mut persisted = lock(&self.persisted);
        persisted.retain(|(p, _), _| p != project);
        for ((p, id), record) in live.iter() {
            if p == project {
                persisted.insert((p.clone(), id.clone()), record.to_json()?);
            }
        }
        Ok(())
    }

    fn vanish_if_due(&self) {
        let mut countdown = lock(&self.vanish_after_finds);
        if let Some(remaining) = countdown.as_mut() {
            if *remaining == 0 {
                lock(&self.live).clear();
                lock(&self.persisted).clear();
                *countdown = None;
            } else {
                *remaining -= 1;
            }
        }
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn find(
        &self,
        project: &str,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, StoreError> {
        self.vanish_if_due();
        Ok(self.get(project, connection_id))
    }

    async fn update(
        &self,
        project: &str,
        connection_id: &str,
        parameters: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut live = lock(&self.live);
        let record = live
            .get_mut(&key(project, connection_id))
            .ok_or_else(|| StoreError::Rejected(format!("connection {connection_id} does not exist")))?;
        record.parameters = parameters;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn schedule_persist(&self, project: &str, reason: &str) {
        lock(&self.persist_requests).push(reason.to_string());
        if self.never_persist.load(Ordering::SeqCst) {
            return;
        }
        if self.persist_lag_reads.load(Ordering::SeqCst) > 0 {
            *lock(&self.pending_persist) = Some(project.to_string());
            return;
        }
        if self.persist(project).is_err() {
            *lock(&self.pending_persist) = Some(project.to_string());
        }
    }

    async fn read_persisted(
        &self,
        project: &str,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, StoreError> {
        if self
            .failing_persisted_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("storage is busy".to_string()));
        }

        let lagging = self
            .persist_lag_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !lagging {
            let pending = lock(&self.pending_persist).take();
            if let Some(pending_project) = pending {
                self.persist(&pending_project)?;
            }
        }

        self.decode_persisted(project, connection_id)
    }
}
