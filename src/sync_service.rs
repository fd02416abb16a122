//! Repository Sync Service
//!
//! Orchestrates the lifecycle of a repository connection: connecting (validate
//! access, encrypt, persist), syncing (claim, decrypt, fetch, transform,
//! persist) and disconnecting.
//!
//! A sync attempt moves the record `pending|success|failed → syncing →
//! success|failed`. Precondition failures are returned as errors; anything that
//! goes wrong after the record has been claimed is reported through a failed
//! [`SyncResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SyncWindowConfig;
use crate::connectors::{ProviderError, RepositoryProvider};
use crate::crypto::{CryptoError, TokenCipher};
use crate::models::{RepositoryRecord, SyncStatus};
use crate::normalization::{normalize_commit, normalize_issue, normalize_pull_request};
use crate::repositories::{
    NewRepositoryConnection, RepositoryConnectionUpdate, RepositoryStore, StoreError,
    SyncDataUpdate,
};

/// Outcome of one sync attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncResult {
    pub success: bool,
    pub commit_count: usize,
    pub pr_count: usize,
    pub issue_count: usize,
    /// Failure message; absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    fn succeeded(commit_count: usize, pr_count: usize, issue_count: usize) -> Self {
        Self {
            success: true,
            commit_count,
            pr_count,
            issue_count,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            commit_count: 0,
            pr_count: 0,
            issue_count: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncServiceError {
    #[error("repository connection {0} not found")]
    NotFound(Uuid),
    #[error("repository connection {0} is inactive")]
    InactiveRepository(Uuid),
    #[error("a sync is already in progress for repository connection {0}")]
    SyncAlreadyInProgress(Uuid),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("repository '{0}' is already connected")]
    Duplicate(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl From<StoreError> for SyncServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => Self::Validation(msg),
            StoreError::Duplicate(name) => Self::Duplicate(name),
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Database(db) => Self::Database(db),
        }
    }
}

/// Why an in-flight attempt stopped. `Vanished` means the record was deleted
/// under us, so there is nothing left to mark as failed.
enum AttemptError {
    Failed(String),
    Vanished(Uuid),
}

impl From<ProviderError> for AttemptError {
    fn from(err: ProviderError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<CryptoError> for AttemptError {
    fn from(err: CryptoError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::Vanished(id),
            other => Self::Failed(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct RepositorySyncService {
    store: RepositoryStore,
    cipher: Arc<TokenCipher>,
    provider: Arc<dyn RepositoryProvider>,
    /// `None` when the configured day count is outside chrono's range.
    commit_window: Option<ChronoDuration>,
    stale_sync_after: Duration,
}

impl RepositorySyncService {
    pub fn new(
        store: RepositoryStore,
        cipher: Arc<TokenCipher>,
        provider: Arc<dyn RepositoryProvider>,
        window: &SyncWindowConfig,
    ) -> Self {
        Self {
            store,
            cipher,
            provider,
            commit_window: ChronoDuration::try_days(window.commit_window_days),
            stale_sync_after: Duration::from_secs(window.stale_sync_seconds),
        }
    }

    pub fn store(&self) -> &RepositoryStore {
        &self.store
    }

    /// Validates access with the provider, then stores the connection with an
    /// encrypted token in `pending` state.
    #[instrument(skip(self, access_token))]
    pub async fn connect_repository(
        &self,
        user_id: Uuid,
        full_name: &str,
        access_token: &str,
    ) -> Result<RepositoryRecord, SyncServiceError> {
        crate::repositories::repository_connection::validate_full_name(full_name)?;

        self.provider.validate_access(full_name, access_token).await?;
        let envelope = self.cipher.encrypt(access_token)?;

        let record = self
            .store
            .create(NewRepositoryConnection {
                user_id,
                full_name: full_name.to_string(),
                access_token: envelope,
                is_active: true,
                sync_status: SyncStatus::Pending,
            })
            .await?;

        info!(repository_id = %record.id, full_name, "Repository connected");
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn disconnect_repository(&self, id: Uuid) -> Result<(), SyncServiceError> {
        self.store.delete(id).await?;
        Ok(())
    }

    pub async fn get_repository_data(&self, id: Uuid) -> Result<RepositoryRecord, SyncServiceError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(SyncServiceError::NotFound(id))
    }

    pub async fn list_repositories(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RepositoryRecord>, SyncServiceError> {
        Ok(self.store.find_by_user_id(user_id).await?)
    }

    /// Toggles activity and/or rotates the access token. A replacement token is
    /// checked against the provider before it is stored.
    #[instrument(skip(self, access_token))]
    pub async fn update_repository(
        &self,
        id: Uuid,
        is_active: Option<bool>,
        access_token: Option<&str>,
    ) -> Result<RepositoryRecord, SyncServiceError> {
        let current = self.get_repository_data(id).await?;

        let access_token = match access_token {
            Some(token) => {
                self.provider
                    .validate_access(&current.full_name, token)
                    .await?;
                Some(self.cipher.encrypt(token)?)
            }
            None => None,
        };

        Ok(self
            .store
            .update(
                id,
                RepositoryConnectionUpdate {
                    is_active,
                    access_token,
                },
            )
            .await?)
    }

    /// Runs one sync attempt for `id`.
    #[instrument(skip(self))]
    pub async fn sync_repository(&self, id: Uuid) -> Result<SyncResult, SyncServiceError> {
        let record = self.get_repository_data(id).await?;
        if !record.is_active {
            return Err(SyncServiceError::InactiveRepository(id));
        }

        if !self.store.try_begin_sync(id, self.stale_sync_after).await? {
            // Lost the claim; re-read to report the precise reason
            return match self.store.find_by_id(id).await? {
                None => Err(SyncServiceError::NotFound(id)),
                Some(current) if !current.is_active => {
                    Err(SyncServiceError::InactiveRepository(id))
                }
                Some(_) => Err(SyncServiceError::SyncAlreadyInProgress(id)),
            };
        }

        let started = Instant::now();
        info!(repository_id = %id, full_name = %record.full_name, "Sync started");

        let result = match self.run_attempt(id, &record.full_name).await {
            Ok(result) => {
                counter!("repository_sync_total", "outcome" => "success").increment(1);
                info!(
                    repository_id = %id,
                    commits = result.commit_count,
                    pull_requests = result.pr_count,
                    issues = result.issue_count,
                    "Sync completed"
                );
                result
            }
            Err(AttemptError::Vanished(id)) => {
                counter!("repository_sync_total", "outcome" => "vanished").increment(1);
                warn!(repository_id = %id, "Repository disconnected during sync");
                SyncResult::failed(format!("repository connection {id} was removed during sync"))
            }
            Err(AttemptError::Failed(message)) => {
                counter!("repository_sync_total", "outcome" => "failed").increment(1);
                warn!(repository_id = %id, error = %message, "Sync failed");
                self.record_failure(id, &message).await;
                SyncResult::failed(message)
            }
        };

        histogram!("repository_sync_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(result)
    }

    async fn run_attempt(&self, id: Uuid, full_name: &str) -> Result<SyncResult, AttemptError> {
        let envelope = self
            .store
            .find_access_token(id)
            .await?
            .ok_or(AttemptError::Vanished(id))?;
        let token = zeroize::Zeroizing::new(self.cipher.decrypt(&envelope)?);

        let since = self
            .commit_window
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| AttemptError::Failed("commit window is out of range".to_string()))?;
        let (commits, pull_requests, issues) = tokio::try_join!(
            self.provider.fetch_commits(full_name, &token, since),
            self.provider.fetch_pull_requests(full_name, &token),
            self.provider.fetch_issues(full_name, &token),
        )?;

        let commits: Vec<_> = commits.into_iter().map(normalize_commit).collect();
        let pull_requests: Vec<_> = pull_requests
            .into_iter()
            .map(normalize_pull_request)
            .collect();
        let issues: Vec<_> = issues.into_iter().map(normalize_issue).collect();

        let result = SyncResult::succeeded(commits.len(), pull_requests.len(), issues.len());
        self.store
            .update_sync_data(id, SyncDataUpdate::success(commits, pull_requests, issues))
            .await?;
        Ok(result)
    }

    /// Best effort; a failure here must not mask the original error.
    async fn record_failure(&self, id: Uuid, message: &str) {
        if let Err(err) = self
            .store
            .update_sync_data(id, SyncDataUpdate::failed(message))
            .await
        {
            error!(repository_id = %id, error = %err, "Failed to record sync failure");
        }
    }
}

impl std::fmt::Debug for RepositorySyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySyncService")
            .field("commit_window", &self.commit_window)
            .field("stale_sync_after", &self.stale_sync_after)
            .finish_non_exhaustive()
    }
}
