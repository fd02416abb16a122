//! Repository connection store
//!
//! SeaORM operations for the `repository_connections` table. Reads return
//! [`RepositoryRecord`], which leaves the encrypted access token behind; the
//! token is only loaded through [`RepositoryStore::find_access_token`].

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::NullOrdering;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, Order,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::repository_connection::{
    self, ActiveModel, Column, Entity as RepositoryConnection, RepositoryRecord, SyncStatus,
};
use crate::models::sync_items::{Commit, PullRequest, RepositoryIssue};

const MAX_OWNER_LEN: usize = 39;
const MAX_REPO_LEN: usize = 100;
const MAX_TOKEN_LEN: usize = 4096;

static FULL_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$").expect("full name pattern compiles")
});

/// Errors raised by [`RepositoryStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("repository '{0}' is already connected")]
    Duplicate(String),
    #[error("repository connection {0} not found")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Fields required to create a connection. `access_token` is already an envelope.
#[derive(Debug, Clone)]
pub struct NewRepositoryConnection {
    pub user_id: Uuid,
    pub full_name: String,
    pub access_token: String,
    pub is_active: bool,
    pub sync_status: SyncStatus,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct RepositoryConnectionUpdate {
    pub is_active: Option<bool>,
    pub access_token: Option<String>,
}

/// Outcome of a sync attempt written back in one statement.
///
/// Collections left as `None` keep their stored value. `error: None` clears any
/// previously stored failure message.
#[derive(Debug, Clone)]
pub struct SyncDataUpdate {
    pub commits: Option<Vec<Commit>>,
    pub pull_requests: Option<Vec<PullRequest>>,
    pub issues: Option<Vec<RepositoryIssue>>,
    pub status: SyncStatus,
    pub error: Option<String>,
}

impl SyncDataUpdate {
    pub fn success(
        commits: Vec<Commit>,
        pull_requests: Vec<PullRequest>,
        issues: Vec<RepositoryIssue>,
    ) -> Self {
        Self {
            commits: Some(commits),
            pull_requests: Some(pull_requests),
            issues: Some(issues),
            status: SyncStatus::Success,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            commits: None,
            pull_requests: None,
            issues: None,
            status: SyncStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Store for repository connection records
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    db: Arc<DatabaseConnection>,
}

impl RepositoryStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a new connection. Fails with `Duplicate` if `full_name` is taken.
    pub async fn create(
        &self,
        new: NewRepositoryConnection,
    ) -> Result<RepositoryRecord, StoreError> {
        validate_full_name(&new.full_name)?;
        validate_token(&new.access_token)?;

        let id = Uuid::new_v4();
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = ActiveModel {
            id: Set(id),
            user_id: Set(new.user_id),
            full_name: Set(new.full_name.clone()),
            access_token: Set(new.access_token),
            is_active: Set(new.is_active),
            sync_status: Set(new.sync_status),
            sync_error: Set(None),
            last_sync_time: Set(None),
            commits: Set(Default::default()),
            pull_requests: Set(Default::default()),
            issues: Set(Default::default()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        RepositoryConnection::insert(model)
            .exec(&*self.db)
            .await
            .map_err(|err| match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    StoreError::Duplicate(new.full_name.clone())
                }
                _ => StoreError::Database(err),
            })?;

        info!(
            repository_id = %id,
            user_id = %new.user_id,
            full_name = %new.full_name,
            "Repository connection created"
        );

        self.find_by_id(id).await?.ok_or(StoreError::NotFound(id))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RepositoryRecord>, StoreError> {
        Ok(RepositoryConnection::find_by_id(id)
            .into_partial_model::<RepositoryRecord>()
            .one(&*self.db)
            .await?)
    }

    /// All connections owned by `user_id`, most recently updated first.
    pub async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RepositoryRecord>, StoreError> {
        Ok(RepositoryConnection::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::UpdatedAt)
            .order_by_asc(Column::Id)
            .into_partial_model::<RepositoryRecord>()
            .all(&*self.db)
            .await?)
    }

    /// Active connections, stalest first. Never-synced records lead.
    pub async fn find_all_active(&self) -> Result<Vec<RepositoryRecord>, StoreError> {
        Ok(RepositoryConnection::find()
            .filter(Column::IsActive.eq(true))
            .order_by_with_nulls(Column::LastSyncTime, Order::Asc, NullOrdering::First)
            .order_by_asc(Column::CreatedAt)
            .into_partial_model::<RepositoryRecord>()
            .all(&*self.db)
            .await?)
    }

    /// Loads the encrypted access token. The only read path that touches it.
    pub async fn find_access_token(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(RepositoryConnection::find_by_id(id)
            .select_only()
            .column(Column::AccessToken)
            .into_tuple::<String>()
            .one(&*self.db)
            .await?)
    }

    /// Every stored token envelope, keyed by connection. Used by key rotation.
    pub async fn find_all_access_tokens(&self) -> Result<Vec<(Uuid, String)>, StoreError> {
        Ok(RepositoryConnection::find()
            .select_only()
            .column(Column::Id)
            .column(Column::AccessToken)
            .order_by_asc(Column::CreatedAt)
            .into_tuple::<(Uuid, String)>()
            .all(&*self.db)
            .await?)
    }

    /// Swaps the stored envelope without touching `updated_at`.
    pub async fn replace_access_token(&self, id: Uuid, envelope: String) -> Result<(), StoreError> {
        validate_token(&envelope)?;
        let result = RepositoryConnection::update_many()
            .set(ActiveModel {
                access_token: Set(envelope),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub async fn update(
        &self,
        id: Uuid,
        update: RepositoryConnectionUpdate,
    ) -> Result<RepositoryRecord, StoreError> {
        if let Some(token) = update.access_token.as_deref() {
            validate_token(token)?;
        }

        let existing = RepositoryConnection::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        let mut model: repository_connection::ActiveModel = existing.into();
        if let Some(is_active) = update.is_active {
            model.is_active = Set(is_active);
        }
        if let Some(access_token) = update.access_token {
            model.access_token = Set(access_token);
        }
        model.updated_at = Set(Utc::now().into());

        let updated = model.update(&*self.db).await.map_err(|err| match err {
            DbErr::RecordNotUpdated => StoreError::NotFound(id),
            other => StoreError::Database(other),
        })?;

        debug!(repository_id = %id, "Repository connection updated");
        Ok(updated.into())
    }

    /// Records the outcome of a sync attempt.
    ///
    /// Issued as a single conditional `UPDATE`, so a record deleted mid-sync
    /// yields `NotFound` instead of being written again.
    pub async fn update_sync_data(
        &self,
        id: Uuid,
        update: SyncDataUpdate,
    ) -> Result<RepositoryRecord, StoreError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let mut changes = ActiveModel {
            sync_status: Set(update.status),
            sync_error: Set(update.error),
            last_sync_time: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        if let Some(commits) = update.commits {
            changes.commits = Set(commits.into());
        }
        if let Some(pull_requests) = update.pull_requests {
            changes.pull_requests = Set(pull_requests.into());
        }
        if let Some(issues) = update.issues {
            changes.issues = Set(issues.into());
        }

        let result = RepositoryConnection::update_many()
            .set(changes)
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(id));
        }

        self.find_by_id(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Atomically moves an active record into `syncing`.
    ///
    /// Returns `false` when the record is missing, inactive, or already syncing.
    /// A record whose `syncing` state is older than `stale_after` can be claimed
    /// again so a crashed attempt does not lock it forever.
    pub async fn try_begin_sync(&self, id: Uuid, stale_after: Duration) -> Result<bool, StoreError> {
        let now = Utc::now();
        // A timeout reaching past the earliest representable time never expires
        let stale_cutoff: Option<DateTimeWithTimeZone> = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|stale_after| now.checked_sub_signed(stale_after))
            .map(Into::into);

        let mut claimable = Condition::any().add(Column::SyncStatus.ne(SyncStatus::Syncing));
        if let Some(cutoff) = stale_cutoff {
            claimable = claimable.add(Column::UpdatedAt.lt(cutoff));
        }

        let result = RepositoryConnection::update_many()
            .set(ActiveModel {
                sync_status: Set(SyncStatus::Syncing),
                updated_at: Set(now.into()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .filter(Column::IsActive.eq(true))
            .filter(claimable)
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Removes the record and its embedded collections.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = RepositoryConnection::delete_by_id(id)
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(id));
        }

        info!(repository_id = %id, "Repository connection deleted");
        Ok(())
    }
}

/// Checks `owner/repo` shape and GitHub's length limits.
pub fn validate_full_name(full_name: &str) -> Result<(), StoreError> {
    let captures = FULL_NAME_PATTERN.captures(full_name).ok_or_else(|| {
        StoreError::Validation(format!(
            "full_name '{full_name}' must look like 'owner/repo'"
        ))
    })?;

    let owner = &captures[1];
    let repo = &captures[2];
    if owner.len() > MAX_OWNER_LEN {
        return Err(StoreError::Validation(format!(
            "owner must be at most {MAX_OWNER_LEN} characters"
        )));
    }
    if repo.len() > MAX_REPO_LEN {
        return Err(StoreError::Validation(format!(
            "repository name must be at most {MAX_REPO_LEN} characters"
        )));
    }
    if repo == "." || repo == ".." {
        return Err(StoreError::Validation(
            "repository name cannot be '.' or '..'".to_string(),
        ));
    }
    Ok(())
}

fn validate_token(token: &str) -> Result<(), StoreError> {
    if token.is_empty() {
        return Err(StoreError::Validation(
            "access token must not be empty".to_string(),
        ));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(StoreError::Validation(format!(
            "access token must be at most {MAX_TOKEN_LEN} characters"
        )));
    }
    Ok(())
}
