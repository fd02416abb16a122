//! Repository connection entity model
//!
//! SeaORM entity for the `repository_connections` table. Default reads go
//! through [`RepositoryRecord`], a partial model that never selects the
//! encrypted access token.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{DerivePartialModel, FromQueryResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::sync_items::{CommitList, IssueList, PullRequestList};

/// Sync lifecycle of a connection: `pending -> syncing -> success | failed`,
/// re-entering `syncing` on every attempt.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "syncing")]
    Syncing,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// A user's link to one GitHub repository plus its last synced activity.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repository_connections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// `owner/repo`, unique across the system
    #[sea_orm(unique)]
    pub full_name: String,

    /// Token cipher envelope; never returned to callers
    #[sea_orm(column_type = "Text")]
    pub access_token: String,

    pub is_active: bool,

    pub sync_status: SyncStatus,

    /// Last failure message, only present while `sync_status = failed`
    #[sea_orm(column_type = "Text", nullable)]
    pub sync_error: Option<String>,

    /// Completion time of the last sync attempt, successful or not
    pub last_sync_time: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "JsonBinary")]
    pub commits: CommitList,

    #[sea_orm(column_type = "JsonBinary")]
    pub pull_requests: PullRequestList,

    #[sea_orm(column_type = "JsonBinary")]
    pub issues: IssueList,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Connection row without the access token column.
#[derive(Clone, Debug, PartialEq, Eq, DerivePartialModel, FromQueryResult)]
#[sea_orm(entity = "Entity")]
pub struct RepositoryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub last_sync_time: Option<DateTimeWithTimeZone>,
    pub commits: CommitList,
    pub pull_requests: PullRequestList,
    pub issues: IssueList,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl From<Model> for RepositoryRecord {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            full_name: model.full_name,
            is_active: model.is_active,
            sync_status: model.sync_status,
            sync_error: model.sync_error,
            last_sync_time: model.last_sync_time,
            commits: model.commits,
            pull_requests: model.pull_requests,
            issues: model.issues,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
